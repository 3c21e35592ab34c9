//! Print the OpenAPI document of the session API as pretty JSON.

use utoipa::OpenApi;
use watch_party_back::services::documentation::ApiDoc;

fn main() -> Result<(), serde_json::Error> {
    println!("{}", ApiDoc::openapi().to_pretty_json()?);
    Ok(())
}
