//! Process entry point for the device-pool orchestrator (spec §2 "(added)
//! C11").
//!
//! Contains no orchestration logic of its own: it reads the environment
//! knobs from a TOML-backed [`pool_core::config_store::TomlConfigStore`],
//! builds the long-lived [`pool_core::registry::Registry`],
//! [`pool_core::loader::Loader`], [`pool_core::event_bus::EventBus`], and
//! [`pool_core::controller::SessionTable`], and drives the housekeeping
//! tick that ages temporary composites (spec §4.8). Controller files are
//! expected to be loaded by whatever front-end (middleware, CLI, test
//! harness) sits in front of this crate; this binary only establishes the
//! composition root and keeps the process alive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pool_core::config_store::TomlConfigStore;
use pool_core::controller::SessionTable;
use pool_core::event_bus::EventBus;
use pool_core::hotreload::HotReloadOrchestrator;
use pool_core::loader::Loader;
use pool_core::registry::Registry;
use pool_core::temporary::TemporaryRegistry;

/// How often the housekeeping thread advances temporary-composite age
/// counters (spec §4.8 imposes no specific cadence).
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "poold", about = "Device-pool orchestrator process")]
struct Args {
    /// Path to the TOML file holding the pool environment (`pool_path`,
    /// `tmpElement_MaxInactTime`, `defaultMotPos_AbsChange`,
    /// `defaultCtVal_AbsChange`) and persisted property overrides.
    #[arg(long, default_value = "pool.toml")]
    config: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config_store = match TomlConfigStore::open(&args.config) {
        Ok(store) => store,
        Err(e) => {
            log::error!("failed to open config store {:?}: {e}", args.config);
            std::process::exit(1);
        }
    };
    let environment = config_store.environment();
    log::info!(
        "starting poold: pool_path={:?}, tmpElement_MaxInactTime={}s",
        environment.pool_path,
        environment.tmp_element_max_inact_time_secs
    );

    let registry = Arc::new(Registry::new());
    let sessions = Arc::new(SessionTable::new());
    let loader = Arc::new(Loader::new(environment.pool_path.clone()));
    let bus = Arc::new(EventBus::new());
    let _hotreload = HotReloadOrchestrator::new(
        registry.clone(),
        sessions.clone(),
        loader.clone(),
        bus.clone(),
    );
    let temporaries = Arc::new(std::sync::Mutex::new(TemporaryRegistry::new()));

    let max_inactive_ticks = environment
        .tmp_element_max_inact_time_secs
        .max(1)
        .div_ceil(HOUSEKEEPING_INTERVAL.as_secs().max(1));

    let housekeeping_registry = registry.clone();
    let housekeeping_temporaries = temporaries.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(HOUSEKEEPING_INTERVAL);
        let expired = housekeeping_temporaries
            .lock()
            .unwrap()
            .advance_and_collect(max_inactive_ticks);
        for group_id in expired {
            log::debug!("housekeeping: temporary composite {group_id} aged out, deleting");
            if let Err(e) = housekeeping_registry.delete_element(group_id) {
                log::warn!("housekeeping: failed to delete {group_id}: {e}");
                continue;
            }
            housekeeping_temporaries.lock().unwrap().untrack(group_id);
        }
    });

    log::info!("poold ready");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
