use std::cell::RefCell;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot::Sender;

use log::{error, info, warn};

pub mod cache;
pub mod config;
pub mod http;
pub mod world;

use cache::store::DirectoryStore;
use cache::xtea::KeyTable;
use config::ServerConfig;
use world::region_model::{CacheData, RegionModel};


struct ServerControl {
    stop_signal: Sender<()>,
    handle: JoinHandle<()>,
}


thread_local! {
    static SERVER_CONTROL: RefCell<Option<ServerControl>> = RefCell::new(None);
}


/// Loads the cache named by `config` and wraps it for on demand region decoding.
pub fn load_region_model(config: &ServerConfig) -> RegionModel {
    let keys = match &config.keys {
        None => {
            warn!("no key file given, encrypted regions will have no objects");
            KeyTable::default()
        }
        Some(path) => KeyTable::read(path).unwrap_or_else(|err| {
            error!("cannot read keys from {}: {err}", path.display());
            KeyTable::default()
        }),
    };

    let store = DirectoryStore::new(&config.cache_dir);
    RegionModel::new(Arc::new(CacheData::load(Box::new(store), keys, config)))
}


/// Starts the http service on its own thread.
pub fn spawn_server(model: Arc<RegionModel>, port: u16) -> (Sender<()>, JoinHandle<()>) {
    let (http_stop_tx, http_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = std::thread::spawn(move || {
        http::http_server_service(model, port, http_stop_rx);
    });
    (http_stop_tx, handle)
}


#[no_mangle]
pub extern "C" fn start_landscape_server() -> bool {
    info!("start landscape server");
    SERVER_CONTROL.with(|control| {
        if control.borrow().is_some() {
            return false;
        }

        let config = ServerConfig::default();
        let model = Arc::new(load_region_model(&config));
        let (stop_signal, handle) = spawn_server(model, config.port);
        control.replace(Some(ServerControl { stop_signal, handle }));

        true
    })
}


#[no_mangle]
pub extern "C" fn stop_landscape_server() -> bool {
    info!("stop landscape server");
    SERVER_CONTROL.with(|control| {
        let Some(control) = control.replace(None) else {
            return false;
        };

        if control.stop_signal.send(()).is_err() {
            warn!("server already stopped");
        }
        if control.handle.join().is_err() {
            error!("server thread panicked");
        }

        true
    })
}
