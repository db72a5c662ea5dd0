// src/conexoes.rs

//! # Registo de conexões e salas
//!
//! Mantém o mapa das conexões WebSocket vivas (cada uma com o seu canal de
//! envio) e as salas de difusão: a sala passiva dos passageiros e uma sala
//! efémera por corrida. Todos os envios passam por aqui.

use axum::extract::ws::Message;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Sala passiva onde todos os passageiros identificados entram.
pub const SALA_PASSAGEIROS: &str = "passageiros";

/// Nome da sala efémera de uma corrida.
pub fn sala_corrida(corrida_id: &str) -> String {
    format!("ride:{}", corrida_id)
}

/// Papel que uma conexão assume depois do `identificar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipoConexao {
    Motorista,
    Passageiro,
}

#[derive(Clone)]
struct Conexao {
    tx: mpsc::Sender<Message>,
    tipo: Option<TipoConexao>,
}

/// Estado partilhado das conexões e das salas.
#[derive(Clone, Default)]
pub struct ConexoesState {
    conexoes: Arc<Mutex<HashMap<String, Conexao>>>,
    salas: Arc<Mutex<HashMap<String, HashSet<String>>>>,
}

impl ConexoesState {
    /// Regista uma conexão acabada de abrir, ainda sem papel.
    pub fn registar(&self, conn_id: String, tx: mpsc::Sender<Message>) {
        self.conexoes
            .lock()
            .unwrap()
            .insert(conn_id, Conexao { tx, tipo: None });
    }

    /// Atribui o papel declarado no `identificar`.
    pub fn identificar(&self, conn_id: &str, tipo: TipoConexao) {
        if let Some(conexao) = self.conexoes.lock().unwrap().get_mut(conn_id) {
            conexao.tipo = Some(tipo);
        }
    }

    pub fn tipo_de(&self, conn_id: &str) -> Option<TipoConexao> {
        self.conexoes
            .lock()
            .unwrap()
            .get(conn_id)
            .and_then(|c| c.tipo)
    }

    /// Remove a conexão do registo e de todas as salas onde estava.
    pub fn remover(&self, conn_id: &str) {
        self.conexoes.lock().unwrap().remove(conn_id);

        let mut salas = self.salas.lock().unwrap();
        for membros in salas.values_mut() {
            membros.remove(conn_id);
        }
        salas.retain(|_, membros| !membros.is_empty());
    }

    pub fn entrar_sala(&self, sala: &str, conn_id: &str) {
        self.salas
            .lock()
            .unwrap()
            .entry(sala.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    pub fn membro_da_sala(&self, sala: &str, conn_id: &str) -> bool {
        self.salas
            .lock()
            .unwrap()
            .get(sala)
            .map(|membros| membros.contains(conn_id))
            .unwrap_or(false)
    }

    /// Expulsa todos os membros de uma sala (fim de corrida).
    pub fn esvaziar_sala(&self, sala: &str) {
        self.salas.lock().unwrap().remove(sala);
    }

    pub fn total(&self) -> usize {
        self.conexoes.lock().unwrap().len()
    }

    /// Envia um evento já serializado a uma única conexão.
    pub async fn emitir_para(&self, conn_id: &str, texto: String) {
        let tx = {
            let conexoes = self.conexoes.lock().unwrap();
            conexoes.get(conn_id).map(|c| c.tx.clone())
        };

        match tx {
            Some(tx) => {
                if tx.send(Message::Text(texto.into())).await.is_err() {
                    eprintln!("Falha ao enviar para a conexão {}; evento perdido.", conn_id);
                }
            }
            None => println!("Conexão {} já não existe; evento descartado.", conn_id),
        }
    }

    /// Envia um evento já serializado a todos os membros de uma sala.
    pub async fn emitir_para_sala(&self, sala: &str, texto: String) {
        // Clona os destinos com os locks soltos antes de qualquer await.
        let membros: Vec<String> = {
            let salas = self.salas.lock().unwrap();
            match salas.get(sala) {
                Some(membros) => membros.iter().cloned().collect(),
                None => return,
            }
        };
        let destinos: Vec<mpsc::Sender<Message>> = {
            let conexoes = self.conexoes.lock().unwrap();
            membros
                .iter()
                .filter_map(|id| conexoes.get(id).map(|c| c.tx.clone()))
                .collect()
        };

        let mensagem = Message::Text(texto.into());
        for tx in destinos {
            let _ = tx.send(mensagem.clone()).await;
        }
    }
}
