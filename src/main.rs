use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod cli;
mod error;
mod metrics;
mod models;
mod services;
mod state;

use cli::{Command, CommandArgs, ServeArgs};
use models::launch::DEFAULT_SCRIPT;
use models::LaunchProfile;
use services::{render_ecosystem, ImageLoader, OnnxSegmenter, Segmenter};
use state::new_state;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    match args.command {
        None => serve(args.serve),
        Some(Command::Ecosystem { profile, output }) => {
            let profile = match profile {
                Some(path) => LaunchProfile::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => LaunchProfile::for_service(&args.serve, DEFAULT_SCRIPT),
            };
            let js = render_ecosystem(&profile)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, js)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    log::info!("✅ Wrote {}", path.display());
                }
                None => print!("{}", js),
            }
            Ok(())
        }
        Some(Command::CheckProfile { path }) => {
            let profile = LaunchProfile::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let issues = profile.issues();
            if issues.is_empty() {
                println!("✓ {} is valid (process '{}')", path.display(), profile.name);
                return Ok(());
            }
            for issue in &issues {
                println!("✗ {}", issue);
            }
            anyhow::bail!("{} issue(s) found in {}", issues.len(), path.display())
        }
    }
}

fn serve(args: ServeArgs) -> anyhow::Result<()> {
    actix_rt::System::new().block_on(run_server(args))
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    log::info!("🔄 Loading segmentation model from {}...", args.model_path.display());

    // 模型加载失败不退出，/health 会报告 model_loaded=false
    let segmenter: Option<Arc<dyn Segmenter>> =
        match OnnxSegmenter::load(&args.model_path, args.input_size, args.probability_output) {
            Ok(model) => {
                log::info!("✅ Model '{}' loaded successfully", model.name());
                Some(Arc::new(model))
            }
            Err(e) => {
                log::error!("❌ Failed to load model: {}", e);
                for cause in e.chain().skip(1) {
                    log::error!("     - {}", cause);
                }
                log::warn!("   /remove-bg will answer 503 until the model is available");
                None
            }
        };

    let image_loader = ImageLoader::new(
        Duration::from_secs(args.fetch_timeout_secs),
        args.max_upload_bytes(),
    )?;
    let state = new_state(segmenter, image_loader);

    print_banner(&args);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(api::configure)
    });
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    server
        .bind(args.bind_address())
        .with_context(|| format!("failed to bind {}", args.bind_address()))?
        .run()
        .await?;
    Ok(())
}

fn print_banner(args: &ServeArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      BG Remover v{:<41}║", env!("CARGO_PKG_VERSION"));
    println!("║      BiRefNet background removal API                      ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}", args.bind_address());
    println!();
    println!("📋 Available endpoints:");
    println!("  POST   /remove-bg   - Remove image background");
    println!("  GET    /ping        - Liveness probe");
    println!("  GET    /health      - Health check (model status)");
    println!("  GET    /metrics     - Prometheus metrics");
    println!();
    println!("💡 Inputs:");
    println!("  • multipart/form-data: image_file, image_file_b64, image_url");
    println!("  • application/json:    image_file_b64, image_url");
    println!("  • optional: size (preview|medium|hd|50mp|full), format (png|jpg|webp)");
    println!("═══════════════════════════════════════════════════════════");
}
