mod modules;

use modules::{cli, config, content, crypto, database, error, mail, web};

use actix_web::{middleware, web as actix, App, HttpServer};
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use content::templates::TemplateRenderer;
use database::storage::BlogDB;
use log::info;
use mail::{MailRelay, SmtpRelay};
use std::sync::Arc;
use web::routes;
use web::session::session_middleware;

fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let outcome = match cli.command() {
        Commands::InitConfig => cli::init_config(&cli.config),
        Commands::InitDb => Config::load(&cli.config).and_then(|config| cli::init_db(&config)),
        Commands::Serve => return serve(&cli),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[actix_web::main]
async fn serve(cli: &Cli) -> std::io::Result<()> {
    info!("Starting Quill blog...");

    let config = match Config::load(&cli.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded from {}", cli.config.display());
    info!("Database: {}", config.paths.database_path.display());
    if config.mail.recipient.is_empty() {
        log::warn!("No contact recipient configured; contact messages will not be delivered");
    }

    // per-request connections assume the schema already exists
    if let Err(e) = BlogDB::new(&config.paths.database_path) {
        eprintln!("Failed to open database: {}", e);
        std::process::exit(1);
    }

    let renderer = match TemplateRenderer::new(&config) {
        Ok(renderer) => actix::Data::new(renderer),
        Err(e) => {
            eprintln!("Failed to load templates: {}", e);
            std::process::exit(1);
        }
    };
    let relay: Arc<dyn MailRelay> = Arc::new(SmtpRelay::from_config(&config.mail));
    let relay = actix::Data::from(relay);

    let bind_address = config.server_address();
    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(actix::Data::new(config.clone()))
            .app_data(renderer.clone())
            .app_data(relay.clone())
            .wrap(session_middleware(&config))
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
            .configure(routes::configure_static(&config))
    })
    .bind(&bind_address)?
    .run()
    .await
}
