use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Wallet to track, as NAME:ADDRESS. May be repeated.
    #[arg(short, long = "wallet", value_name = "NAME:ADDRESS")]
    pub wallets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_wallet_flags() {
        let cli = Cli::parse_from([
            "wallet-tracker",
            "--config",
            "custom.toml",
            "-w",
            "a:addr1",
            "--wallet",
            "b:addr2",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.wallets, vec!["a:addr1", "b:addr2"]);
        assert!(!cli.debug);
    }
}
