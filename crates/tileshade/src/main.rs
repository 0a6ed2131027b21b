mod bindings;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    let paths = AppPaths::discover()?;
    let loaded = run::load_config(cli.config.as_deref(), &paths)?;

    match cli.command {
        Command::Render(args) => {
            let report = run::render(&loaded, &args)?;
            run::write_json(&report)
        }
        Command::Program => run::print_program(&loaded),
        Command::Config => run::print_config(&loaded),
        Command::Where => {
            run::print_paths(&paths, &loaded);
            Ok(())
        }
    }
}
