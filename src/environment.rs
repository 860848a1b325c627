use std::{env, net::SocketAddr, path::PathBuf};

use once_cell::sync::Lazy;

#[derive(Debug)]
pub struct HttpEnvironment {
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
    pub template_dir: PathBuf,
    pub site_name: String,
}

pub static HTTP_ENVIRONMENT: Lazy<HttpEnvironment> = Lazy::new(|| HttpEnvironment {
    bind: env::var("BIND")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()
        .expect("$BIND should be a valid SocketAddr"),
    static_dir: env::var_os("STATIC_DIR")
        .unwrap_or_else(|| "static".into())
        .into(),
    template_dir: env::var_os("TEMPLATE_DIR")
        .unwrap_or_else(|| "templates".into())
        .into(),
    site_name: env::var("SITE_NAME").unwrap_or_else(|_| "webpage".to_string()),
});
