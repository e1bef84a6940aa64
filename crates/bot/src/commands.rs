//! Chat command parsing and validation.

use std::str::FromStr;

use jobwatch_core::{parse_csv, CoreError, PollingInterval, MIN_INTERVAL_MINUTES};
use jobwatch_store::StoreError;

/// Errors raised while parsing or executing a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("/{command} needs an argument, e.g. {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },

    #[error(transparent)]
    InvalidInterval(#[from] CoreError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl CommandError {
    /// Text sent back to the user.
    pub fn reply(&self) -> String {
        match self {
            CommandError::MissingArgument { .. } => self.to_string(),
            CommandError::InvalidInterval(e) => format!(
                "{e}. Send a whole number of minutes, {MIN_INTERVAL_MINUTES} or more, e.g. /interval 30"
            ),
            CommandError::Store(_) => {
                "Something went wrong while saving your settings, please try again later.".to_string()
            }
        }
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Keywords(Vec<String>),
    Cities(Vec<String>),
    Interval(PollingInterval),
    Pause,
    Resume,
    Status,
    Unknown(String),
}

impl Command {
    pub const KEYWORDS_USAGE: &'static str = "/keywords golang,devops";
    pub const CITIES_USAGE: &'static str = "/cities Москва,Казань";
    pub const INTERVAL_USAGE: &'static str = "/interval 30";
}

/// Split `/name@bot args` into the lowercased name and the trimmed arguments.
fn split_command(text: &str) -> (String, &str) {
    let text = text.trim();
    let (head, args) = match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim()),
        None => (text, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    (name, args)
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_command(s);

        let command = match name.as_str() {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/pause" => Command::Pause,
            "/resume" => Command::Resume,
            "/status" => Command::Status,
            "/keywords" => {
                let keywords = parse_csv(args);
                if keywords.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "keywords",
                        usage: Self::KEYWORDS_USAGE,
                    });
                }
                Command::Keywords(keywords)
            }
            "/cities" => {
                let cities = parse_csv(args);
                if cities.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "cities",
                        usage: Self::CITIES_USAGE,
                    });
                }
                Command::Cities(cities)
            }
            "/interval" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "interval",
                        usage: Self::INTERVAL_USAGE,
                    });
                }
                Command::Interval(args.parse()?)
            }
            _ => Command::Unknown(s.trim().to_string()),
        };

        Ok(command)
    }
}
