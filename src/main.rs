use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use gemini_core::client::{ClientConfig, ClientSessionFactory};
use gemini_core::server::middleware::{AccessControl, CertificateAuth, RateLimiter};
use gemini_core::server::{LocationConfig, MiddlewareChain, Middleware, Router, ServerConfig, serve_connection};
use gemini_core::tls::{build_server_config, ClientTlsMode};
use gemini_core::tofu::TofuStore;
use log::{error, info};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

#[derive(Parser)]
#[command(name = "nauyaca", about = "A dual-role Gemini protocol client and server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a single gemini:// URL and print its response to stdout.
    Get {
        url: String,
        #[arg(long, default_value_t = false)]
        insecure: bool,
    },
    /// Serve a document root over Gemini.
    ///
    /// Either `--config` (a TOML file with a `[server]` table) or
    /// `--document-root`/`--cert`/`--key` must be given; explicit flags win over
    /// whatever a supplied config file sets.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        document_root: Option<PathBuf>,
        #[arg(long)]
        cert: Option<PathBuf>,
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    match Cli::parse().command {
        Command::Get { url, insecure } => run_get(&url, insecure).await,
        Command::Serve {
            config,
            host,
            port,
            document_root,
            cert,
            key,
        } => run_serve(config, host, port, document_root, cert, key).await,
    }
}

async fn run_get(url: &str, insecure: bool) -> Result<()> {
    let tofu = Arc::new(TofuStore::open_default().context("opening TOFU store")?);
    let factory = ClientSessionFactory::new(tofu);

    let mut config = ClientConfig::default();
    if insecure {
        config.tls_mode = ClientTlsMode::AcceptAny;
    }
    let session = factory.session(config);

    let response = session.get(url, true).await.context("fetching URL")?;
    println!("{} {}", response.status(), response.meta());
    if let Some(body) = response.body_text() {
        println!("{body}");
    }
    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    document_root: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::from_file(&path).context("loading server config")?,
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(document_root) = document_root {
        config.document_root = document_root;
    }
    if let (Some(cert), Some(key)) = (&cert, &key) {
        config = config.with_tls(cert, key);
    }
    config.validate().context("validating server configuration")?;

    let host = config.host.clone();
    let port = config.port;
    let document_root = config.document_root.clone();
    let cert = config
        .certfile
        .clone()
        .ok_or_else(|| eyre!("serving requires --cert/--key or a config file that sets them"))?;
    let key = config
        .keyfile
        .clone()
        .ok_or_else(|| eyre!("serving requires --cert/--key or a config file that sets them"))?;

    let cert_chain = load_cert_chain(&cert)?;
    let private_key = load_private_key(&key)?;
    let tls_config = build_server_config(cert_chain, private_key).context("building server TLS config")?;
    let acceptor = TlsAcceptor::from(tls_config);

    let mut router = Router::new();
    if config.locations.is_empty() {
        let root_location = LocationConfig::static_files("/", document_root.clone())
            .context("building default document-root location")?;
        router.add_location(&root_location).context("registering default location")?;
    } else {
        for location in &config.locations {
            router
                .add_location(location)
                .with_context(|| format!("registering location {:?}", location.prefix))?;
        }
    }
    let router = Arc::new(router);

    let mut stages: Vec<Box<dyn Middleware>> = Vec::new();
    if let Some(access_control) = config.access_control {
        stages.push(Box::new(AccessControl::new(access_control)));
    }
    if let Some(rate_limit) = config.rate_limit {
        let rate_limiter = Arc::new(RateLimiter::new(rate_limit));
        rate_limiter.start();
        stages.push(Box::new(rate_limiter));
    }
    if let Some(certificate_auth) = config.certificate_auth {
        stages.push(Box::new(CertificateAuth::new(certificate_auth)));
    }
    let middleware = Arc::new(MiddlewareChain::new(stages));

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .context("binding listener")?;
    info!("nauyaca listening on {host}:{port}");

    loop {
        let (tcp, remote_addr) = listener.accept().await.context("accepting connection")?;
        let acceptor = acceptor.clone();
        let router = router.clone();
        let middleware = middleware.clone();

        tokio::spawn(async move {
            let mut tls_stream = match acceptor.accept(tcp).await {
                Ok(stream) => stream,
                Err(err) => {
                    error!("TLS handshake failed: {err}");
                    return;
                }
            };

            let peer_cert_der = tls_stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(gemini_core::tls::end_entity_der);

            serve_connection(&mut tls_stream, remote_addr.ip(), peer_cert_der, &middleware, &router).await;
        });
    }
}

fn load_cert_chain(path: &PathBuf) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening certificate file {path:?}"))?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing certificate file {path:?}"))
}

fn load_private_key(path: &PathBuf) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening key file {path:?}"))?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("parsing key file {path:?}"))?
        .ok_or_else(|| eyre!("no private key found in {path:?}"))
}
