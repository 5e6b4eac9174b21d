use clap::{Parser, Subcommand};

/// Accept, define and award NIP-58 badges across many relays
#[derive(Parser, Debug)]
#[command(name = "ribbon", version)]
pub struct Cli {
    /// Relay URL to use instead of the configured list (repeatable)
    #[arg(long = "relay", global = true)]
    pub relays: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add an awarded badge to your displayed badges
    Accept {
        /// Definition reference, `30009:<issuer-hex>:<identifier>`
        definition: String,
        /// Id of the award record (64 hex)
        award: String,
    },

    /// Publish a badge definition unless it already exists
    Define {
        /// Unique identifier (`d` tag) of the badge
        identifier: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Image URL
        #[arg(long)]
        image: Option<String>,
        /// Thumbnail URL (repeatable)
        #[arg(long = "thumb")]
        thumbs: Vec<String>,
    },

    /// Award one of your badges to recipients
    Award {
        /// Identifier of a badge you defined
        identifier: String,
        /// Recipient public keys (npub or 64 hex)
        #[arg(required = true)]
        recipients: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_accept() {
        let cli = Cli::try_parse_from([
            "ribbon",
            "--relay",
            "ws://localhost:7777",
            "accept",
            "30009:abc:welcome",
            "def",
        ])
        .unwrap();
        assert_eq!(cli.relays, vec!["ws://localhost:7777"]);
        match cli.command {
            Command::Accept { definition, award } => {
                assert_eq!(definition, "30009:abc:welcome");
                assert_eq!(award, "def");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_award_needs_a_recipient() {
        assert!(Cli::try_parse_from(["ribbon", "award", "welcome"]).is_err());
    }

    #[test]
    fn test_define_needs_a_name() {
        assert!(Cli::try_parse_from(["ribbon", "define", "welcome"]).is_err());
        let cli =
            Cli::try_parse_from(["ribbon", "define", "welcome", "--name", "Welcome"]).unwrap();
        assert!(matches!(cli.command, Command::Define { .. }));
    }
}
