//! Provider adapters behind the `netplane_core` backend traits.
//!
//! - `controller`: overlay network controller over HTTP
//! - `catalog`: service catalog over HTTP
//! - `directory`: system-model directory over HTTP
//! - `memory`: in-process implementations of all three

pub mod catalog;
pub mod controller;
pub mod directory;
pub mod http;
pub mod memory;

pub use catalog::HttpCatalog;
pub use controller::HttpController;
pub use directory::HttpDirectory;
pub use memory::{MemoryCatalog, MemoryController, MemoryDirectory};

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;
    use reqwest::Url;

    /// Serves `router` on an ephemeral loopback port and returns its base URL.
    pub(crate) async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }
}
