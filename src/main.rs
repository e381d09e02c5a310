//! cache-push - CI build cache uploader
//!
//! Entry point for the CLI application.

use clap::Parser;
use cache_push::{
    cli::Cli,
    error::{ExitCode, StructuredError},
    logging,
};

fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    let result = cache_push::load_config(&cli).and_then(|config| {
        logging::init_logging(
            logging::effective_verbosity(cli.verbose, config.is_debug_mode),
            cli.quiet,
        );
        cache_push::run_app(&config)
    });

    match result {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = ExitCode::for_error(&err);

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{}", json);
                } else {
                    eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
