// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use actix::Actor;
use actix_cors::Cors;
use actix_web::{App, Error, HttpRequest, HttpResponse, HttpServer, Responder, web};
use actix_web_actors::ws;
use clap::Parser;
use shuttle::routes_catalog::RouteCatalog;
use std::path::PathBuf;
use std::sync::Arc;

mod coordinator;
mod protocol;
mod websocket;

use coordinator::TrackerCoordinator;
use websocket::ShuttleWebSocket;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,
    #[arg(short, long, default_value_t = 4000)]
    port: u16,
    /// Path to a json route catalog. Uses the builtin UIU routes if omitted.
    #[arg(long)]
    routes: Option<PathBuf>,
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    coordinator: web::Data<actix::Addr<TrackerCoordinator>>,
) -> Result<HttpResponse, Error> {
    ws::start(
        ShuttleWebSocket::new(coordinator.get_ref().clone()),
        &req,
        stream,
    )
}

async fn get_routes(catalog: web::Data<Arc<RouteCatalog>>) -> impl Responder {
    HttpResponse::Ok().json(catalog.routes())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let catalog = Arc::new(match &args.routes {
        Some(path) => RouteCatalog::from_json_file(path).expect("failed to load route catalog"),
        None => RouteCatalog::builtin(),
    });

    let coordinator = TrackerCoordinator::new(catalog.clone()).start();

    log::info!(
        "Starting shuttle tracker on {}:{} with {} route(s)",
        args.address,
        args.port,
        catalog.routes().len()
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(catalog.clone()))
            .app_data(web::Data::new(coordinator.clone()))
            .route("/api/routes", web::get().to(get_routes))
            .route("/ws", web::get().to(ws_index))
    })
    .workers(args.workers)
    .bind((args.address.as_str(), args.port))?
    .run()
    .await
}
