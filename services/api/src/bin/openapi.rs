//! services/api/src/bin/openapi.rs
//!
//! This binary generates the OpenAPI 3.0 document for the REST API
//! and saves it to a file named `openapi.json`.

use smoker_api::web::rest::ApiDoc;
use utoipa::OpenApi;

fn generate_doc(
    api_doc: utoipa::openapi::OpenApi,
    path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc_json = api_doc.to_pretty_json()?;
    std::fs::write(path, doc_json)?;
    println!("OpenAPI document generated at {}", path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    generate_doc(ApiDoc::openapi(), "openapi.json")?;
    Ok(())
}
