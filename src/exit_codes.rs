use crate::{config, prompt, session, store};
use std::process::ExitCode;

pub const EXIT_SOFTWARE: u8 = 1;
pub const EXIT_IO: u8 = 2;
pub const EXIT_USAGE: u8 = 64;

pub fn exit_code_for_config_error(error: &config::ConfigError) -> ExitCode {
    use config::ConfigError::*;

    match error {
        Io(_) | HomeUnavailable => ExitCode::from(EXIT_IO),
        Parse(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_store_error(error: &store::StoreError) -> ExitCode {
    use store::StoreError::*;

    match error {
        Io(_) | LockHeld => ExitCode::from(EXIT_IO),
        UnsupportedPlatform => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_prompt_error(error: &prompt::PromptError) -> ExitCode {
    use prompt::PromptError::*;

    match error {
        Io(_) => ExitCode::from(EXIT_IO),
        Empty => ExitCode::from(EXIT_USAGE),
    }
}

pub fn exit_code_for_session_error(error: &session::SessionError) -> ExitCode {
    use session::SessionError::*;

    match error {
        Prompt(err) => exit_code_for_prompt_error(err),
        // Fatal crypto failure: the process cannot derive keys safely.
        Crypto(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}
