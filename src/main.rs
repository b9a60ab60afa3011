mod cli;
mod config;
mod crypto;
mod entry;
mod exit_codes;
mod prompt;
mod secrets;
mod session;
mod store;

use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    // Wipe secrets before exiting on SIGINT/SIGTERM.
    secrets::install_interrupt_trap();

    let config = match config::load(cli.store.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return exit_codes::exit_code_for_config_error(&err);
        }
    };

    let store = match store::DirStore::open(&config.store_dir) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("{err}");
            return exit_codes::exit_code_for_store_error(&err);
        }
    };

    let master_password = match prompt::prompt_master_password() {
        Ok(password) => password,
        Err(err) => {
            eprintln!("{err}");
            return exit_codes::exit_code_for_prompt_error(&err);
        }
    };
    println!();

    let mut session = session::Session::new(store, master_password, config.cost);
    let outcome = session.run();
    let closed = session.close();

    if let Err(err) = outcome {
        eprintln!("{err}");
        return exit_codes::exit_code_for_session_error(&err);
    }
    if let Err(err) = closed {
        eprintln!("{err}");
        return exit_codes::exit_code_for_store_error(&err);
    }
    ExitCode::SUCCESS
}
