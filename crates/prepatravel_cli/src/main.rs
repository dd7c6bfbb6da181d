//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `prepatravel_core` wiring outside any UI runtime.
//! - Open the configured database and print schema/row-count facts.

use prepatravel_core::db::migrations::current_user_version;
use prepatravel_core::db::open_db;
use prepatravel_core::{
    init_logging_from_config, CoreConfig, MapNodeListQuery, MapNodeRepository,
    SqliteMapNodeRepository,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("prepatravel_core ping={}", prepatravel_core::ping());
    println!("prepatravel_core version={}", prepatravel_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = CoreConfig::from_env();
    if init_logging_from_config(&config)? {
        log::info!("event=cli_start module=cli status=ok");
    }

    let conn = open_db(&config.db_path).map_err(|err| format!("db open failed: {err}"))?;
    let schema_version = current_user_version(&conn).map_err(|err| err.to_string())?;
    let repo = SqliteMapNodeRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let count = repo.count_nodes().map_err(|err| err.to_string())?;

    println!("db_path={}", config.db_path.display());
    println!("schema_version={schema_version}");
    println!("map_nodes={count}");

    let nodes = repo
        .list_nodes(&MapNodeListQuery::default())
        .map_err(|err| err.to_string())?;
    for node in nodes {
        println!(
            "{}\t{:.6}\t{:.6}\t{}",
            node.id, node.lat, node.lng, node.name
        );
    }
    Ok(())
}
