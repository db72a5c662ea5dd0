// src/main.rs

mod conexoes;
mod config;
mod corridas;
mod despacho_handlers;
mod estado;
mod eventos;
mod geo;
mod leilao;
mod motoristas;
mod status_handlers;

use axum::{routing::get, Router};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    println!("🚀 A iniciar a central de corridas...");

    let config = config::Config::load();
    println!(
        "⚙️ Leilão: lotes de {}, {} rodada(s), prazo de {} ms por rodada.",
        config.batch_size, config.max_rounds, config.offer_ttl_ms
    );
    if config.quick_test_mode {
        println!("⚠️ QUICK_TEST_MODE ativo: disponibilidade e frescura ignoradas na seleção.");
    }

    let porta = config.port;
    let app_state = estado::AppState::nova(config);

    // Define as rotas da aplicação
    let app = Router::new()
        .route("/", get(status_handlers::pagina_inicial))
        .route("/status", get(status_handlers::estado_central))
        .route("/ws", get(despacho_handlers::websocket_handler))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], porta));
    println!("✅ Central a escutar em http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(sinal_de_encerramento())
        .await
        .unwrap();

    println!("👋 Central encerrada.");
}

/// Espera por SIGINT ou SIGTERM para o servidor fechar com calma.
async fn sinal_de_encerramento() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("falha ao instalar o handler de Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("falha ao instalar o handler de SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    println!("🛑 Sinal de encerramento recebido; a terminar...");
}
