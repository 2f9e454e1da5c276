pub mod keys;
pub mod secrets;
pub mod tokens;

pub use keys::{handle_keys_command, KeysCommands};
pub use secrets::{handle_secrets_command, SecretsCommands};
pub use tokens::{handle_tokens_command, TokensCommands};
