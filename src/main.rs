use std::net::SocketAddr;

use clap::Parser;
use recipebook::cli::{
    Args, build_config, build_mail_transport, init_logging, load_secret_key, open_database,
    take_mail_password, validate_public_url,
};
use recipebook::create_app;
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets are pulled out of the environment before the runtime starts any threads.
    let Some(secret_key) = load_secret_key(args.secret_key_file.as_deref()) else {
        std::process::exit(1);
    };
    let mail_password = take_mail_password();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to start runtime");
            std::process::exit(1);
        });

    runtime.block_on(serve(args, secret_key, mail_password));
}

async fn serve(args: Args, secret_key: String, mail_password: String) {
    let Some(public_url) = validate_public_url(&args.public_url) else {
        std::process::exit(1);
    };

    let Some(mail_transport) = build_mail_transport(&args, mail_password) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, public_url, secret_key, mail_transport);
    let app = create_app(&config);

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, public_url = %config.public_url, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
