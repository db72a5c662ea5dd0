// src/motoristas.rs

//! # Registo de presença dos motoristas
//!
//! Um registo por conexão de motorista identificada: disponibilidade e a
//! última posição conhecida. O seletor de candidatos do leilão lê daqui.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::geo::Coordenada;

/// Última posição reportada por um motorista, com carimbo em epoch-ms.
#[derive(Debug, Clone, Copy)]
pub struct UltimaPosicao {
    pub coordenada: Coordenada,
    pub em: i64,
}

/// Presença de um motorista conectado.
#[derive(Debug, Clone)]
pub struct Motorista {
    pub conn_id: String,
    pub driver_id: Option<String>,
    pub disponivel: bool,
    pub ultima_posicao: Option<UltimaPosicao>,
}

impl Motorista {
    /// Um motorista é "fresco" quando a última posição não passou da validade.
    pub fn fresco(&self, agora_ms: i64, validade_ms: i64) -> bool {
        self.ultima_posicao
            .map(|p| agora_ms - p.em <= validade_ms)
            .unwrap_or(false)
    }

    /// Elegível para receber ofertas: disponível e com posição fresca.
    pub fn elegivel(&self, agora_ms: i64, validade_ms: i64) -> bool {
        self.disponivel && self.fresco(agora_ms, validade_ms)
    }
}

/// Estado partilhado do registo de motoristas.
#[derive(Clone, Default)]
pub struct MotoristasState {
    motoristas: Arc<Mutex<HashMap<String, Motorista>>>,
}

impl MotoristasState {
    /// Cria o registo no `identificar`; começa indisponível e sem posição.
    pub fn registar(&self, conn_id: &str, driver_id: Option<String>) {
        self.motoristas.lock().unwrap().insert(
            conn_id.to_string(),
            Motorista {
                conn_id: conn_id.to_string(),
                driver_id,
                disponivel: false,
                ultima_posicao: None,
            },
        );
    }

    pub fn definir_disponivel(&self, conn_id: &str, disponivel: bool) -> bool {
        match self.motoristas.lock().unwrap().get_mut(conn_id) {
            Some(motorista) => {
                motorista.disponivel = disponivel;
                true
            }
            None => false,
        }
    }

    /// Atualiza a última posição. Coordenadas não finitas são ignoradas.
    pub fn atualizar_localizacao(
        &self,
        conn_id: &str,
        coordenada: Coordenada,
        agora_ms: i64,
    ) -> bool {
        if !coordenada.valida() {
            return false;
        }
        match self.motoristas.lock().unwrap().get_mut(conn_id) {
            Some(motorista) => {
                motorista.ultima_posicao = Some(UltimaPosicao {
                    coordenada,
                    em: agora_ms,
                });
                true
            }
            None => false,
        }
    }

    pub fn get(&self, conn_id: &str) -> Option<Motorista> {
        self.motoristas.lock().unwrap().get(conn_id).cloned()
    }

    /// Marca indisponível sem apagar o registo (desconexão). Uma reconexão
    /// traz sempre um conn_id novo.
    pub fn marcar_indisponivel(&self, conn_id: &str) {
        if let Some(motorista) = self.motoristas.lock().unwrap().get_mut(conn_id) {
            motorista.disponivel = false;
        }
    }

    /// Cópia de todos os registos, para o seletor de candidatos.
    pub fn snapshot(&self) -> Vec<Motorista> {
        self.motoristas.lock().unwrap().values().cloned().collect()
    }

    /// (online, disponíveis) para o resumo operacional.
    pub fn contagem(&self) -> (usize, usize) {
        let motoristas = self.motoristas.lock().unwrap();
        let disponiveis = motoristas.values().filter(|m| m.disponivel).count();
        (motoristas.len(), disponiveis)
    }
}
