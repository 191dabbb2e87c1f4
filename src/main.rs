use actix::Actor;
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use mongodb::Client;

use splitsettle::notify::{LogTransport, Notifier};
use splitsettle::settings::Settings;
use splitsettle::store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::new().map_err(std::io::Error::other)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "splitsettle={level},actix_web={level}",
            level = settings.log.level
        ))
        .init();

    tracing::info!("Using database {} at {}", settings.database.name, settings.database.uri);
    let client = Client::with_uri_str(&settings.database.uri)
        .await
        .map_err(std::io::Error::other)?;
    let store = Store::new(&client, &settings.database.name);
    store.init().await.map_err(std::io::Error::other)?;
    tracing::info!("Connected");

    let notifier = Notifier::new(LogTransport).start();
    let auth = settings.auth.clone();
    let allowed_origins = settings.server.allowed_origins.clone();

    tracing::info!("Listening on {}:{}", settings.server.host, settings.server.port);
    HttpServer::new(move || {
        let cors = if allowed_origins.is_empty() {
            Cors::permissive()
        } else {
            allowed_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .allow_any_method()
                .allow_any_header()
        };
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(auth.clone()))
            .app_data(web::Data::new(notifier.clone()))
            .configure(splitsettle::routes::configure)
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await
}
