// src/config.rs

//! # Configuração da central
//!
//! Todos os parâmetros vêm de variáveis de ambiente com valores por defeito,
//! carregadas de um `.env` local quando existe.

use dotenvy::dotenv;
use std::env;

/// Parâmetros de funcionamento da central de corridas.
#[derive(Debug, Clone)]
pub struct Config {
    /// Porta HTTP/WebSocket do servidor.
    pub port: u16,
    /// Quantos motoristas recebem oferta em cada rodada do leilão.
    pub batch_size: usize,
    /// Duração de uma rodada de ofertas, em milissegundos.
    pub offer_ttl_ms: u64,
    /// Número máximo de rodadas antes de desistir da corrida.
    pub max_rounds: u32,
    /// Idade máxima da última posição para o motorista contar como "fresco".
    pub driver_stale_ms: i64,
    /// Modo de teste rápido: ignora disponibilidade e frescura na seleção.
    pub quick_test_mode: bool,
}

impl Config {
    pub fn load() -> Self {
        dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10000);
        let batch_size = env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);
        let offer_ttl_ms = env::var("OFFER_TTL_MS")
            .unwrap_or_else(|_| "12000".to_string())
            .parse()
            .unwrap_or(12_000);
        let max_rounds = env::var("MAX_ROUNDS")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .unwrap_or(3);
        let driver_stale_ms = env::var("DRIVER_STALE_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse()
            .unwrap_or(30_000);
        let quick_test_mode = env::var("QUICK_TEST_MODE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            port,
            batch_size,
            offer_ttl_ms,
            max_rounds,
            driver_stale_ms,
            quick_test_mode,
        }
    }
}
