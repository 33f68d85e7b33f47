use std::error::Error;
use std::time::{Duration, Instant};
use texcache::assets::{self, FileDecoder, RegistryOptions, TextureHandle};
use texcache::config;
use texcache::core::gfx::Backend;

const FRAME: Duration = Duration::from_millis(16);
const MAX_FRAMES: u32 = 600;

/// `alias=path` registers under an alias, a bare path registers without one.
///
/// The split happens at the first `=`, and only when the text before it has
/// no path separator, so `shots/a=b.png` stays a plain path. A file whose
/// bare name contains `=` can be registered as `./a=b.png`.
fn parse_arg(arg: &str) -> (Option<&str>, &str) {
    match arg.split_once('=') {
        Some((alias, path))
            if !alias.is_empty() && !path.is_empty() && !alias.contains(['/', '\\']) =>
        {
            (Some(alias), path)
        }
        _ => (None, arg),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load(config::CONFIG_PATH);
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: texcache [alias=]path...");
        return Ok(());
    }

    let registry = assets::create(
        Box::new(FileDecoder::new()),
        RegistryOptions::from_config(&cfg),
    )?;
    let mut backend = Backend::software(None);
    log::info!("Uploading through the {} backend.", backend.backend_type());

    let mut handles = Vec::new();
    for arg in &args {
        let (alias, path) = parse_arg(arg);
        registry.register(path, alias);
        if let Some(alias) = alias {
            handles.push(TextureHandle::new(&registry, alias));
        }
    }

    let started = Instant::now();
    let mut frames = 0;
    while !registry.is_settled() && frames < MAX_FRAMES {
        let report = registry.pump_uploads(&mut backend);
        if report.uploaded + report.failed > 0 {
            log::debug!("Frame {frames}: {report:?}");
        }
        for handle in &mut handles {
            handle.refresh();
        }
        frames += 1;
        std::thread::sleep(FRAME);
    }
    registry.pump_uploads(&mut backend);
    for handle in &mut handles {
        handle.refresh();
    }

    for handle in &handles {
        let tex = handle.get();
        if tex.is_empty() {
            println!("{}: not available", handle.alias());
        } else {
            println!(
                "{}: {} {}x{} {:?}",
                handle.alias(),
                tex.canonical_path(),
                tex.width(),
                tex.height(),
                tex.gpu_handle()
            );
        }
    }
    drop(handles);

    let records = assets::destroy()?;
    let ready = records.iter().filter(|r| r.is_ready()).count();
    println!(
        "{ready}/{} texture(s) ready after {frames} frame(s) in {:.1?}.",
        records.len(),
        started.elapsed()
    );
    backend.dispose_textures();
    Ok(())
}
