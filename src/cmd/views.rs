use std::path::Path;

use station_pipeline::{Store, ViewMaterializer};

use super::require_existing;

pub fn run(database: &Path, views_dir: Option<&Path>, list: bool) -> anyhow::Result<()> {
    require_existing(database)?;

    if list {
        let store = Store::open(Some(database), None)?;
        for name in store.view_names()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let materializer = ViewMaterializer::from_dir(views_dir)?;
    let mut store = Store::open_for_run(Some(database), None)?;
    let names = materializer.materialize(store.connection_mut())?;

    println!("Rebuilt {} views in {}", names.len(), database.display());
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}
