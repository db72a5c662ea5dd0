// src/eventos.rs

//! # Protocolo de eventos da central
//!
//! Cada frame de texto do WebSocket transporta um objeto JSON com a forma
//! `{"evento": "<nome>", "dados": {...}}`. Os nomes dos eventos e dos campos
//! seguem o que as aplicações dos motoristas e dos passageiros já falam.

use serde::{Deserialize, Serialize};

use crate::geo::Coordenada;

/// Eventos que os clientes (motoristas e passageiros) enviam à central.
#[derive(Debug, Deserialize)]
#[serde(tag = "evento", content = "dados", rename_all = "snake_case")]
pub enum EventoCliente {
    Identificar(Identificacao),
    DriverStatus(DisponibilidadeMotorista),
    DriverLocalizacao(PosicaoMotorista),
    NovaCorrida(PedidoCorrida),
    CorridaAceita(AceiteMotorista),
    EnviarMensagem(MensagemChat),
    CorridaStatus(MudancaStatus),
}

/// Serializa um evento de saída no envelope `{"evento", "dados"}`.
pub fn evento_json(evento: &str, dados: impl Serialize) -> String {
    serde_json::json!({ "evento": evento, "dados": dados }).to_string()
}

// --- EVENTOS DE ENTRADA ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identificacao {
    pub tipo: String,
    pub driver_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisponibilidadeMotorista {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosicaoMotorista {
    pub ride_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PedidoCorrida {
    pub ride_id: String,
    pub passenger_name: String,
    pub pickup_address: String,
    pub pickup_location: Coordenada,
    pub destination_address: String,
    pub destination_location: Coordenada,
    pub fare: Option<serde_json::Value>,
    pub route_polyline: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AceiteMotorista {
    pub ride_id: String,
    pub offer_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub vehicle_model: String,
    pub vehicle_plate: String,
    pub approach_polyline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MensagemChat {
    pub ride_id: String,
    pub from: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MudancaStatus {
    pub ride_id: String,
    pub by: Option<String>,
    pub status: StatusViagem,
}

/// Estados que os participantes reportam durante a viagem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusViagem {
    ArrivedPickup,
    Ongoing,
    ArrivedDropoff,
    Completed,
    Canceled,
    NoShow,
}

impl StatusViagem {
    /// `completed` e `canceled` encerram a corrida e disparam a limpeza.
    pub fn encerra_corrida(&self) -> bool {
        matches!(self, StatusViagem::Completed | StatusViagem::Canceled)
    }
}

// --- EVENTOS DE SAÍDA ---

/// Resposta ao `identificar` (e a pedidos com tipo desconhecido).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResposta {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_test: Option<bool>,
}

impl StatusResposta {
    pub fn ok(tipo: &str, quick_test: bool) -> Self {
        Self {
            ok: true,
            tipo: Some(tipo.to_string()),
            error: None,
            quick_test: quick_test.then_some(true),
        }
    }

    pub fn erro(error: &str) -> Self {
        Self {
            ok: false,
            tipo: None,
            error: Some(error.to_string()),
            quick_test: None,
        }
    }
}

/// Oferta individualizada enviada a um motorista numa rodada do leilão.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorridaDisponivel {
    pub offer_id: String,
    pub ride_id: String,
    pub passenger_name: String,
    pub pickup_address: String,
    pub pickup_location: Coordenada,
    pub destination_address: String,
    pub destination_location: Coordenada,
    pub route_polyline: Option<String>,
    pub fare: Option<serde_json::Value>,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfertaPerdida {
    pub ride_id: String,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfertaGanha {
    pub ride_id: String,
}

/// Anúncio na sala da corrida quando um motorista vence o leilão.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorridaAceitaAnuncio {
    pub ride_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub vehicle_model: String,
    pub vehicle_plate: String,
    pub status: &'static str,
    pub message: String,
    pub timestamp: i64,
    pub approach_polyline: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemMotoristas {
    pub ride_id: String,
}

/// Posição do motorista retransmitida à sala da corrida, com carimbo do servidor.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PosicaoNaCorrida {
    pub ride_id: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct NovaMensagem {
    pub from: String,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAtualizado {
    pub ride_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    pub status: StatusViagem,
    pub timestamp: i64,
}
