//! Route registration on the ESP-IDF HTTP server.
//!
//! The server's worker task calls the handlers; a `/data` handler blocks for
//! one sensor cycle, serialized by the sampler inside the service.

use anyhow::{Context, Result};
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{EspIOError, Write};
use std::sync::Arc;
use weighnode_core::endpoints::{DATA_PATH, STATUS_PATH};
use weighnode_core::{NodeService, Response};

/// Stack size for the HTTP server task; the data path runs the sampler on it.
const HTTP_STACK_SIZE: usize = 10 * 1024;

/// Start the HTTP server and register both node routes.
pub fn start_server(port: u16, service: Arc<dyn NodeService>) -> Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&Configuration {
        http_port: port,
        stack_size: HTTP_STACK_SIZE,
        ..Default::default()
    })
    .context("Failed to start HTTP server")?;

    let status = service.clone();
    server
        .fn_handler(STATUS_PATH, Method::Get, move |req| -> Result<(), EspIOError> {
            let response = status.status();
            write_response(req, &response)
        })
        .context("Failed to register status route")?;

    server
        .fn_handler(DATA_PATH, Method::Get, move |req| -> Result<(), EspIOError> {
            let response = service.data();
            write_response(req, &response)
        })
        .context("Failed to register data route")?;

    log::info!("HTTP server listening on port {}", port);
    Ok(server)
}

fn write_response(
    req: esp_idf_svc::http::server::Request<&mut esp_idf_svc::http::server::EspHttpConnection>,
    response: &Response,
) -> Result<(), EspIOError> {
    let mut out = req.into_response(
        response.status,
        None,
        &[("Content-Type", response.content_type)],
    )?;
    out.write_all(response.body.as_bytes())?;
    Ok(())
}
