// src/corridas.rs

//! # Registo de corridas ativas
//!
//! Uma corrida por `rideId`, com o leilão pendente, as ofertas emitidas e o
//! timer da rodada. Cada corrida é dona do seu timer: qualquer transição
//! para fora de "procurando" tem de o cancelar.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::conexoes::sala_corrida;
use crate::estado::AppState;
use crate::eventos::PedidoCorrida;
use crate::geo::Coordenada;

/// Tempo que a sala sobrevive depois do fim da corrida, para os últimos
/// eventos ainda chegarem aos participantes.
pub const LINGER_ENCERRAMENTO_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCorrida {
    Procurando,
    Aceita,
    Falhada,
    Concluida,
    Cancelada,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstadoOferta {
    Pendente,
    Ganha,
    Perdida,
    Expirada,
}

/// Uma oferta emitida a um motorista concreto dentro de uma corrida.
#[derive(Debug, Clone)]
pub struct Oferta {
    pub oferta_id: String,
    pub conn_id: String,
    pub emitida_em: i64,
    pub estado: EstadoOferta,
}

/// Estado completo de uma corrida ativa.
#[derive(Debug)]
pub struct Corrida {
    pub corrida_id: String,
    pub status: StatusCorrida,
    pub passageiro_conn_id: String,
    pub passageiro_nome: String,
    pub endereco_embarque: String,
    pub endereco_destino: String,
    pub embarque: Coordenada,
    pub destino: Coordenada,
    pub polilinha_rota: Option<String>,
    pub tarifa: Option<serde_json::Value>,
    /// Ofertas emitidas, por `offerId`.
    pub ofertas: HashMap<String, Oferta>,
    /// Conexões já solicitadas em qualquer rodada; só cresce.
    pub conns_ofertadas: HashSet<String>,
    pub vencedor_conn_id: Option<String>,
    pub rodada: u32,
    pub timer_leilao: Option<JoinHandle<()>>,
}

impl Corrida {
    pub fn nova(pedido: &PedidoCorrida, passageiro_conn_id: String) -> Self {
        Self {
            corrida_id: pedido.ride_id.clone(),
            status: StatusCorrida::Procurando,
            passageiro_conn_id,
            passageiro_nome: pedido.passenger_name.clone(),
            endereco_embarque: pedido.pickup_address.clone(),
            endereco_destino: pedido.destination_address.clone(),
            embarque: pedido.pickup_location,
            destino: pedido.destination_location,
            polilinha_rota: pedido.route_polyline.clone(),
            tarifa: pedido.fare.clone(),
            ofertas: HashMap::new(),
            conns_ofertadas: HashSet::new(),
            vencedor_conn_id: None,
            rodada: 0,
            timer_leilao: None,
        }
    }

    /// Cancela o timer anterior (se houver) e guarda o novo.
    pub fn armar_timer(&mut self, timer: JoinHandle<()>) {
        self.cancelar_timer();
        self.timer_leilao = Some(timer);
    }

    pub fn cancelar_timer(&mut self) {
        if let Some(timer) = self.timer_leilao.take() {
            timer.abort();
        }
    }

    /// Marca como expiradas as ofertas ainda pendentes (saída de "procurando"
    /// sem vencedor).
    pub fn expirar_pendentes(&mut self) {
        for oferta in self.ofertas.values_mut() {
            if oferta.estado == EstadoOferta::Pendente {
                oferta.estado = EstadoOferta::Expirada;
            }
        }
    }
}

/// Estado partilhado do registo de corridas.
#[derive(Clone, Default)]
pub struct CorridasState {
    corridas: Arc<Mutex<HashMap<String, Corrida>>>,
}

impl CorridasState {
    /// Regista uma corrida nova. Devolve `false` se o `rideId` já existir.
    pub fn criar(&self, corrida: Corrida) -> bool {
        let mut corridas = self.corridas.lock().unwrap();
        if corridas.contains_key(&corrida.corrida_id) {
            return false;
        }
        corridas.insert(corrida.corrida_id.clone(), corrida);
        true
    }

    /// Executa `f` com a corrida bloqueada. Toda a mutação de corridas passa
    /// por aqui; nunca fazer await com o lock na mão.
    pub fn com_corrida<R>(&self, corrida_id: &str, f: impl FnOnce(&mut Corrida) -> R) -> Option<R> {
        self.corridas.lock().unwrap().get_mut(corrida_id).map(f)
    }

    /// Remove a corrida e cancela o timer que ainda tiver.
    pub fn remover(&self, corrida_id: &str) -> bool {
        match self.corridas.lock().unwrap().remove(corrida_id) {
            Some(mut corrida) => {
                corrida.cancelar_timer();
                true
            }
            None => false,
        }
    }

    /// Corridas em leilão ou em curso, para o resumo operacional.
    pub fn ativas(&self) -> usize {
        self.corridas
            .lock()
            .unwrap()
            .values()
            .filter(|c| matches!(c.status, StatusCorrida::Procurando | StatusCorrida::Aceita))
            .count()
    }

    /// Corridas em que esta conexão é o motorista vencedor.
    pub fn corridas_do_vencedor(&self, conn_id: &str) -> Vec<String> {
        self.corridas
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.vencedor_conn_id.as_deref() == Some(conn_id))
            .map(|c| c.corrida_id.clone())
            .collect()
    }
}

/// Agenda a limpeza de fim de corrida: passado o linger, esvazia a sala e
/// apaga o registo.
pub fn agendar_limpeza(state: AppState, corrida_id: String) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(LINGER_ENCERRAMENTO_MS)).await;
        state.conexoes.esvaziar_sala(&sala_corrida(&corrida_id));
        if state.corridas.remover(&corrida_id) {
            println!("🧹 Corrida {} removida após o encerramento.", corrida_id);
        }
    });
}
