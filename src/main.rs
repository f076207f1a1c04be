mod cli;
mod commands;
mod env_loader;
mod error;
mod host;
mod tier;

fn main() {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            match err.downcast_ref::<error::TierError>() {
                Some(tier_err) => eprintln!("error[{}]: {err:#}", tier_err.code().as_str()),
                None => eprintln!("error: {err:#}"),
            }
            std::process::exit(1);
        }
    }
}
