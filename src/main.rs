#[cfg(target_arch = "wasm32")]
fn main() {
    use lifesaver::{config, page};
    use log::{error, info};

    // Initialize console error panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    console_log::init_with_level(config::log_level()).expect("error initializing log");

    info!("Starting page scripts");
    if let Err(err) = page::boot() {
        error!("page setup failed: {err}");
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    eprintln!("lifesaver-frontend runs in the browser; build it for wasm32 with trunk");
}
