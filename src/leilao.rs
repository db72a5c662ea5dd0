// src/leilao.rs

//! # Leilão de ofertas
//!
//! Conduz cada corrida por rodadas de ofertas: escolhe os motoristas mais
//! próximos ainda não solicitados, emite ofertas individualizadas com prazo,
//! e ao esgotar as rodadas avisa o passageiro. A primeira aceitação válida
//! ganha; todas as outras perdem.

use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::corridas::{self, EstadoOferta, Oferta, StatusCorrida};
use crate::conexoes::sala_corrida;
use crate::estado::AppState;
use crate::eventos::{
    evento_json, AceiteMotorista, CorridaAceitaAnuncio, CorridaDisponivel, OfertaGanha,
    OfertaPerdida, SemMotoristas,
};
use crate::geo::{self, Coordenada};
use crate::motoristas::MotoristasState;

/// Intervalo entre rodadas quando não apareceu nenhum candidato novo.
const RETRY_SEM_CANDIDATOS_MS: u64 = 2_000;

/// Motorista candidato a receber uma oferta, com a distância ao embarque.
#[derive(Debug, Clone)]
pub struct Candidato {
    pub conn_id: String,
    pub distancia_km: f64,
}

/// Escolhe os candidatos de uma rodada, por ordem crescente de distância.
///
/// Passagem principal: motoristas elegíveis (disponíveis e frescos) ainda não
/// solicitados. Se ficar vazia, a reserva aceita qualquer motorista disponível
/// mesmo sem posição fresca, com distância sentinela. Em quick-test entram
/// todos os conhecidos, com distância zero.
pub fn selecionar_candidatos(
    motoristas: &MotoristasState,
    embarque: &Coordenada,
    ja_ofertadas: &HashSet<String>,
    config: &Config,
    agora_ms: i64,
) -> Vec<Candidato> {
    let todos = motoristas.snapshot();

    if config.quick_test_mode {
        let mut candidatos: Vec<Candidato> = todos
            .into_iter()
            .filter(|m| !ja_ofertadas.contains(&m.conn_id))
            .map(|m| Candidato {
                conn_id: m.conn_id,
                distancia_km: 0.0,
            })
            .collect();
        candidatos.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
        return candidatos;
    }

    let mut principais: Vec<Candidato> = todos
        .iter()
        .filter(|m| {
            m.elegivel(agora_ms, config.driver_stale_ms) && !ja_ofertadas.contains(&m.conn_id)
        })
        .map(|m| Candidato {
            conn_id: m.conn_id.clone(),
            distancia_km: geo::distancia_km(
                m.ultima_posicao.as_ref().map(|p| &p.coordenada),
                Some(embarque),
            ),
        })
        .collect();

    if !principais.is_empty() {
        // Desempate determinista dentro da rodada: distância e depois conn_id.
        principais.sort_by(|a, b| {
            a.distancia_km
                .partial_cmp(&b.distancia_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.conn_id.cmp(&b.conn_id))
        });
        return principais;
    }

    let mut reserva: Vec<Candidato> = todos
        .into_iter()
        .filter(|m| m.disponivel && !ja_ofertadas.contains(&m.conn_id))
        .map(|m| Candidato {
            conn_id: m.conn_id,
            distancia_km: geo::DISTANCIA_SENTINELA_KM,
        })
        .collect();
    reserva.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
    reserva
}

/// Um passo do leilão: monta a rodada atual da corrida e arma o timer da
/// seguinte. Chamado na criação da corrida e em cada disparo de timer.
pub async fn despachar_corrida(state: AppState, corrida_id: String) {
    let agora = Utc::now().timestamp_millis();

    let contexto = state
        .corridas
        .com_corrida(&corrida_id, |c| {
            if c.status != StatusCorrida::Procurando {
                return None;
            }
            Some((c.embarque, c.conns_ofertadas.clone(), c.rodada))
        })
        .flatten();
    let Some((embarque, ja_ofertadas, rodada)) = contexto else {
        return;
    };

    // Rodadas esgotadas: não se abre outra, mesmo que haja candidatos novos.
    if rodada >= state.config.max_rounds {
        tratar_rodada_vazia(state, corrida_id).await;
        return;
    }

    let lote: Vec<Candidato> =
        selecionar_candidatos(&state.motoristas, &embarque, &ja_ofertadas, &state.config, agora)
            .into_iter()
            .take(state.config.batch_size)
            .collect();

    if lote.is_empty() {
        tratar_rodada_vazia(state, corrida_id).await;
        return;
    }

    // Regista as ofertas e arma o timer da rodada sob o lock; os envios
    // ficam para depois de o soltar.
    let emissoes: Vec<(String, String)> = state
        .corridas
        .com_corrida(&corrida_id, |c| {
            if c.status != StatusCorrida::Procurando {
                return Vec::new();
            }
            let mut emissoes = Vec::with_capacity(lote.len());
            for candidato in &lote {
                if c.conns_ofertadas.contains(&candidato.conn_id) {
                    continue;
                }
                let oferta_id = Uuid::new_v4().to_string();
                c.ofertas.insert(
                    oferta_id.clone(),
                    Oferta {
                        oferta_id: oferta_id.clone(),
                        conn_id: candidato.conn_id.clone(),
                        emitida_em: agora,
                        estado: EstadoOferta::Pendente,
                    },
                );
                c.conns_ofertadas.insert(candidato.conn_id.clone());

                let dados = CorridaDisponivel {
                    offer_id: oferta_id,
                    ride_id: c.corrida_id.clone(),
                    passenger_name: c.passageiro_nome.clone(),
                    pickup_address: c.endereco_embarque.clone(),
                    pickup_location: c.embarque,
                    destination_address: c.endereco_destino.clone(),
                    destination_location: c.destino,
                    route_polyline: c.polilinha_rota.clone(),
                    fare: c.tarifa.clone(),
                    expires_at: agora + state.config.offer_ttl_ms as i64,
                };
                emissoes.push((
                    candidato.conn_id.clone(),
                    evento_json("corrida_disponivel", &dados),
                ));
            }

            let timer = agendar_rodada_seguinte(
                state.clone(),
                corrida_id.clone(),
                Duration::from_millis(state.config.offer_ttl_ms),
            );
            c.armar_timer(timer);
            emissoes
        })
        .unwrap_or_default();

    println!(
        "📣 Corrida {}: rodada {} com {} oferta(s).",
        corrida_id,
        rodada,
        emissoes.len()
    );
    for (conn_id, texto) in emissoes {
        state.conexoes.emitir_para(&conn_id, texto).await;
    }
}

/// Rodada sem candidatos novos: ou tenta outra vez daqui a pouco, ou esgota
/// as rodadas e devolve `sem_motoristas` ao passageiro.
async fn tratar_rodada_vazia(state: AppState, corrida_id: String) {
    enum Resultado {
        Esgotada(String),
        NovaTentativa(u32),
        Nada,
    }

    let max_rounds = state.config.max_rounds;
    let resultado = state
        .corridas
        .com_corrida(&corrida_id, |c| {
            if c.status != StatusCorrida::Procurando {
                return Resultado::Nada;
            }
            if c.rodada + 1 >= max_rounds {
                c.status = StatusCorrida::Falhada;
                c.cancelar_timer();
                c.expirar_pendentes();
                Resultado::Esgotada(c.passageiro_conn_id.clone())
            } else {
                c.rodada += 1;
                let timer = agendar_despacho(
                    state.clone(),
                    corrida_id.clone(),
                    Duration::from_millis(RETRY_SEM_CANDIDATOS_MS),
                );
                c.armar_timer(timer);
                Resultado::NovaTentativa(c.rodada)
            }
        })
        .unwrap_or(Resultado::Nada);

    match resultado {
        Resultado::Esgotada(passageiro_conn_id) => {
            println!(
                "😞 Corrida {} sem motoristas após {} rodada(s).",
                corrida_id, max_rounds
            );
            state
                .conexoes
                .emitir_para(
                    &passageiro_conn_id,
                    evento_json(
                        "sem_motoristas",
                        &SemMotoristas {
                            ride_id: corrida_id.clone(),
                        },
                    ),
                )
                .await;
            corridas::agendar_limpeza(state, corrida_id);
        }
        Resultado::NovaTentativa(rodada) => {
            println!(
                "⏳ Corrida {}: sem candidatos, rodada {} em {} ms.",
                corrida_id, rodada, RETRY_SEM_CANDIDATOS_MS
            );
        }
        Resultado::Nada => {}
    }
}

/// Timer de re-tentativa: dorme e volta a despachar tal como está.
fn agendar_despacho(state: AppState, corrida_id: String, atraso: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(atraso).await;
        // O handle guardado na corrida é o desta própria tarefa; larga-o
        // antes de re-despachar para o novo timer não nos abortar.
        state.corridas.com_corrida(&corrida_id, |c| {
            c.timer_leilao = None;
        });
        despachar_corrida(state, corrida_id).await;
    })
}

/// Timer de fim de rodada: ao expirar o prazo das ofertas avança a rodada e
/// volta a despachar, se a corrida ainda estiver à procura.
fn agendar_rodada_seguinte(state: AppState, corrida_id: String, atraso: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(atraso).await;
        let continua = state
            .corridas
            .com_corrida(&corrida_id, |c| {
                c.timer_leilao = None;
                if c.status == StatusCorrida::Procurando {
                    c.rodada += 1;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if continua {
            despachar_corrida(state, corrida_id).await;
        }
    })
}

/// Árbitro de aceitação: decide, corrida a corrida, quem fica com ela.
///
/// A decisão inteira acontece com o lock da corrida na mão, por isso duas
/// aceitações simultâneas nunca produzem dois vencedores. Ofertas de rodadas
/// anteriores continuam pendentes e válidas enquanto a corrida procurar.
pub async fn aceitar_corrida(state: AppState, conn_id: &str, aceite: AceiteMotorista) {
    enum Veredicto {
        Vitoria { perdedores: Vec<String>, espera_ms: i64 },
        Recusa(&'static str),
    }

    let agora = Utc::now().timestamp_millis();
    let veredicto = state.corridas.com_corrida(&aceite.ride_id, |c| {
        if c.status != StatusCorrida::Procurando {
            return Veredicto::Recusa("not_searching");
        }
        let valida = matches!(
            c.ofertas.get(&aceite.offer_id),
            Some(oferta) if oferta.conn_id == conn_id && oferta.estado == EstadoOferta::Pendente
        );
        if !valida {
            return Veredicto::Recusa("offer_invalid");
        }

        c.status = StatusCorrida::Aceita;
        c.vencedor_conn_id = Some(conn_id.to_string());
        c.cancelar_timer();

        let mut perdedores = Vec::new();
        let mut espera_ms = 0;
        for oferta in c.ofertas.values_mut() {
            if oferta.oferta_id == aceite.offer_id {
                oferta.estado = EstadoOferta::Ganha;
                espera_ms = agora - oferta.emitida_em;
            } else if oferta.estado == EstadoOferta::Pendente {
                oferta.estado = EstadoOferta::Perdida;
                perdedores.push(oferta.conn_id.clone());
            }
        }
        Veredicto::Vitoria {
            perdedores,
            espera_ms,
        }
    });

    let Some(veredicto) = veredicto else {
        // Corrida desconhecida (já removida ou nunca existiu).
        state
            .conexoes
            .emitir_para(
                conn_id,
                evento_json(
                    "offer_lost",
                    &OfertaPerdida {
                        ride_id: aceite.ride_id.clone(),
                        reason: "not_searching",
                    },
                ),
            )
            .await;
        return;
    };

    match veredicto {
        Veredicto::Recusa(reason) => {
            state
                .conexoes
                .emitir_para(
                    conn_id,
                    evento_json(
                        "offer_lost",
                        &OfertaPerdida {
                            ride_id: aceite.ride_id.clone(),
                            reason,
                        },
                    ),
                )
                .await;
        }
        Veredicto::Vitoria {
            perdedores,
            espera_ms,
        } => {
            println!(
                "🤝 Corrida {} aceite pelo motorista {} ({} ms após a oferta).",
                aceite.ride_id, conn_id, espera_ms
            );

            let sala = sala_corrida(&aceite.ride_id);
            state.conexoes.entrar_sala(&sala, conn_id);

            let anuncio = CorridaAceitaAnuncio {
                ride_id: aceite.ride_id.clone(),
                driver_id: aceite.driver_id.clone(),
                driver_name: aceite.driver_name.clone(),
                driver_phone: aceite.driver_phone.clone(),
                vehicle_model: aceite.vehicle_model.clone(),
                vehicle_plate: aceite.vehicle_plate.clone(),
                status: "accepted",
                message: "Motorista a caminho!".to_string(),
                timestamp: agora,
                approach_polyline: aceite.approach_polyline.clone(),
            };
            state
                .conexoes
                .emitir_para_sala(&sala, evento_json("corrida_aceita", &anuncio))
                .await;

            state
                .conexoes
                .emitir_para(
                    conn_id,
                    evento_json(
                        "offer_won",
                        &OfertaGanha {
                            ride_id: aceite.ride_id.clone(),
                        },
                    ),
                )
                .await;

            let recusa = evento_json(
                "offer_lost",
                &OfertaPerdida {
                    ride_id: aceite.ride_id.clone(),
                    reason: "already_taken",
                },
            );
            for perdedor in perdedores {
                state.conexoes.emitir_para(&perdedor, recusa.clone()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estado::teste::{
        config_de_teste, estado_de_teste, motorista_pronto, passageiro, proximo_evento,
    };
    use crate::corridas::Corrida;
    use crate::eventos::PedidoCorrida;

    fn ponto(latitude: f64, longitude: f64) -> Coordenada {
        Coordenada {
            latitude,
            longitude,
        }
    }

    fn embarque_se() -> Coordenada {
        ponto(-23.550, -46.633)
    }

    fn pedido(ride_id: &str) -> PedidoCorrida {
        serde_json::from_value(serde_json::json!({
            "rideId": ride_id,
            "passengerName": "Ana",
            "pickupAddress": "Praça da Sé",
            "pickupLocation": {"latitude": -23.550, "longitude": -46.633},
            "destinationAddress": "Av. Paulista",
            "destinationLocation": {"latitude": -23.561, "longitude": -46.655},
            "fare": 25
        }))
        .unwrap()
    }

    fn aceite(ride_id: &str, offer_id: &str) -> AceiteMotorista {
        AceiteMotorista {
            ride_id: ride_id.to_string(),
            offer_id: offer_id.to_string(),
            driver_id: "m-1".to_string(),
            driver_name: "João".to_string(),
            driver_phone: "+5511999990000".to_string(),
            vehicle_model: "Onix".to_string(),
            vehicle_plate: "ABC1D23".to_string(),
            approach_polyline: None,
        }
    }

    /// Cria a corrida como o gateway faria e dispara a primeira rodada.
    async fn criar_corrida(state: &AppState, ride_id: &str, passageiro_conn: &str) {
        let corrida = Corrida::nova(&pedido(ride_id), passageiro_conn.to_string());
        assert!(state.corridas.criar(corrida));
        state
            .conexoes
            .entrar_sala(&sala_corrida(ride_id), passageiro_conn);
        despachar_corrida(state.clone(), ride_id.to_string()).await;
    }

    #[test]
    fn selecao_ordena_por_distancia_e_exclui_ja_ofertadas() {
        let state = estado_de_teste(config_de_teste());
        let agora = chrono::Utc::now().timestamp_millis();

        for (conn_id, coordenada) in [
            ("longe", ponto(-23.580, -46.680)),
            ("perto", ponto(-23.551, -46.634)),
        ] {
            state.motoristas.registar(conn_id, None);
            state.motoristas.definir_disponivel(conn_id, true);
            state.motoristas.atualizar_localizacao(conn_id, coordenada, agora);
        }
        // Indisponível: nunca entra.
        state.motoristas.registar("parado", None);
        state
            .motoristas
            .atualizar_localizacao("parado", ponto(-23.550, -46.633), agora);

        let candidatos = selecionar_candidatos(
            &state.motoristas,
            &embarque_se(),
            &HashSet::new(),
            &state.config,
            agora,
        );
        let ordem: Vec<&str> = candidatos.iter().map(|c| c.conn_id.as_str()).collect();
        assert_eq!(ordem, vec!["perto", "longe"]);
        assert!(candidatos[0].distancia_km < candidatos[1].distancia_km);

        let ja_ofertadas: HashSet<String> = ["perto".to_string()].into();
        let candidatos = selecionar_candidatos(
            &state.motoristas,
            &embarque_se(),
            &ja_ofertadas,
            &state.config,
            agora,
        );
        let ordem: Vec<&str> = candidatos.iter().map(|c| c.conn_id.as_str()).collect();
        assert_eq!(ordem, vec!["longe"]);
    }

    #[test]
    fn reserva_aceita_disponiveis_sem_posicao_fresca() {
        let state = estado_de_teste(config_de_teste());
        let agora = chrono::Utc::now().timestamp_millis();

        // Disponível mas nunca reportou posição.
        state.motoristas.registar("cego", None);
        state.motoristas.definir_disponivel("cego", true);
        // Disponível mas com posição velha.
        state.motoristas.registar("velho", None);
        state.motoristas.definir_disponivel("velho", true);
        state.motoristas.atualizar_localizacao(
            "velho",
            ponto(-23.551, -46.634),
            agora - state.config.driver_stale_ms - 1_000,
        );
        // Indisponível: fora até da reserva.
        state.motoristas.registar("parado", None);

        let candidatos = selecionar_candidatos(
            &state.motoristas,
            &embarque_se(),
            &HashSet::new(),
            &state.config,
            agora,
        );
        let mut ordem: Vec<&str> = candidatos.iter().map(|c| c.conn_id.as_str()).collect();
        ordem.sort();
        assert_eq!(ordem, vec!["cego", "velho"]);
        assert!(candidatos
            .iter()
            .all(|c| c.distancia_km == geo::DISTANCIA_SENTINELA_KM));
    }

    #[test]
    fn quick_test_ignora_disponibilidade_e_frescura() {
        let mut config = config_de_teste();
        config.quick_test_mode = true;
        let state = estado_de_teste(config);
        let agora = chrono::Utc::now().timestamp_millis();

        state.motoristas.registar("parado", None);
        state.motoristas.registar("velho", None);
        state.motoristas.definir_disponivel("velho", true);
        state.motoristas.atualizar_localizacao(
            "velho",
            ponto(-23.551, -46.634),
            agora - 60_000,
        );

        let candidatos = selecionar_candidatos(
            &state.motoristas,
            &embarque_se(),
            &HashSet::new(),
            &state.config,
            agora,
        );
        assert_eq!(candidatos.len(), 2);
        assert!(candidatos.iter().all(|c| c.distancia_km == 0.0));
    }

    #[tokio::test]
    async fn primeira_rodada_oferece_e_primeira_aceitacao_ganha() {
        let state = estado_de_teste(config_de_teste());
        let (passageiro_conn, mut rx_passageiro) = passageiro(&state);
        let (d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r1", &passageiro_conn).await;

        let (evento, dados_d1) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "corrida_disponivel");
        assert_eq!(dados_d1["rideId"], "r1");
        assert_eq!(dados_d1["passengerName"], "Ana");
        let (evento, dados_d2) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "corrida_disponivel");
        assert_ne!(dados_d1["offerId"], dados_d2["offerId"]);

        aceitar_corrida(
            state.clone(),
            &d1,
            aceite("r1", dados_d1["offerId"].as_str().unwrap()),
        )
        .await;

        // O vencedor entra na sala antes do anúncio: recebe-o e depois o
        // offer_won direto.
        let (evento, dados) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "corrida_aceita");
        assert_eq!(dados["status"], "accepted");
        let (evento, dados) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "offer_won");
        assert_eq!(dados["rideId"], "r1");

        let (evento, dados) = proximo_evento(&mut rx_passageiro).await;
        assert_eq!(evento, "corrida_aceita");
        assert_eq!(dados["driverName"], "João");

        let (evento, dados) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "offer_lost");
        assert_eq!(dados["reason"], "already_taken");

        let (status, vencedor, ganhas) = state
            .corridas
            .com_corrida("r1", |c| {
                let ganhas = c
                    .ofertas
                    .values()
                    .filter(|o| o.estado == EstadoOferta::Ganha)
                    .count();
                (c.status, c.vencedor_conn_id.clone(), ganhas)
            })
            .unwrap();
        assert_eq!(status, StatusCorrida::Aceita);
        assert_eq!(vencedor.as_deref(), Some(d1.as_str()));
        assert_eq!(ganhas, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn segundo_motorista_recebe_oferta_apos_o_prazo() {
        let mut config = config_de_teste();
        config.batch_size = 1;
        config.offer_ttl_ms = 500;
        let state = estado_de_teste(config);

        let (passageiro_conn, _rx_passageiro) = passageiro(&state);
        let (_d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r2", &passageiro_conn).await;

        let (evento, _) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "corrida_disponivel");

        // O prazo da rodada 0 expira e a rodada 1 oferece ao segundo.
        let (evento, dados) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "corrida_disponivel");

        aceitar_corrida(
            state.clone(),
            &d2,
            aceite("r2", dados["offerId"].as_str().unwrap()),
        )
        .await;

        let (evento, _) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "corrida_aceita");
        let (evento, _) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "offer_won");

        // A oferta da rodada 0 continuava pendente, por isso o primeiro
        // motorista é avisado de que perdeu.
        let (evento, dados) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "offer_lost");
        assert_eq!(dados["reason"], "already_taken");
    }

    #[tokio::test(start_paused = true)]
    async fn aceitacao_tardia_de_rodada_anterior_ainda_ganha() {
        let mut config = config_de_teste();
        config.batch_size = 1;
        config.offer_ttl_ms = 500;
        let state = estado_de_teste(config);

        let (passageiro_conn, _rx_passageiro) = passageiro(&state);
        let (d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (_d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r3", &passageiro_conn).await;

        let (_, dados_d1) = proximo_evento(&mut rx_d1).await;
        // Deixa o prazo expirar; a rodada 1 já ofereceu ao segundo motorista.
        let (evento, _) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "corrida_disponivel");

        aceitar_corrida(
            state.clone(),
            &d1,
            aceite("r3", dados_d1["offerId"].as_str().unwrap()),
        )
        .await;

        let (evento, _) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "corrida_aceita");
        let (evento, _) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "offer_won");

        let (evento, dados) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "offer_lost");
        assert_eq!(dados["reason"], "already_taken");
    }

    #[tokio::test(start_paused = true)]
    async fn esgotamento_avisa_o_passageiro_e_limpa_a_corrida() {
        let state = estado_de_teste(config_de_teste());
        let (passageiro_conn, mut rx_passageiro) = passageiro(&state);

        criar_corrida(&state, "r4", &passageiro_conn).await;

        let (evento, dados) = proximo_evento(&mut rx_passageiro).await;
        assert_eq!(evento, "sem_motoristas");
        assert_eq!(dados["rideId"], "r4");

        // Aceitação tardia contra uma corrida falhada.
        let (d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        aceitar_corrida(state.clone(), &d1, aceite("r4", "oferta-inventada")).await;
        let (evento, dados) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "offer_lost");
        assert_eq!(dados["reason"], "not_searching");

        // Depois do linger a corrida desaparece de vez.
        tokio::time::sleep(Duration::from_millis(corridas::LINGER_ENCERRAMENTO_MS + 500)).await;
        assert!(state.corridas.com_corrida("r4", |_| ()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn nenhuma_conexao_recebe_duas_ofertas_da_mesma_corrida() {
        let mut config = config_de_teste();
        config.batch_size = 5;
        config.offer_ttl_ms = 500;
        let state = estado_de_teste(config);

        let (passageiro_conn, mut rx_passageiro) = passageiro(&state);
        let (_d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (_d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r5", &passageiro_conn).await;

        // Ninguém aceita; as rodadas esgotam-se.
        let (evento, _) = proximo_evento(&mut rx_passageiro).await;
        assert_eq!(evento, "sem_motoristas");

        for rx in [&mut rx_d1, &mut rx_d2] {
            let mut ofertas = 0;
            while let Ok(mensagem) = rx.try_recv() {
                let axum::extract::ws::Message::Text(texto) = mensagem else {
                    continue;
                };
                let valor: serde_json::Value = serde_json::from_str(&texto).unwrap();
                if valor["evento"] == "corrida_disponivel" {
                    ofertas += 1;
                }
            }
            assert_eq!(ofertas, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rodadas_param_no_limite_mesmo_com_candidatos_novos() {
        let mut config = config_de_teste();
        config.batch_size = 1;
        config.max_rounds = 2;
        config.offer_ttl_ms = 500;
        let state = estado_de_teste(config);

        let (passageiro_conn, mut rx_passageiro) = passageiro(&state);
        let (_d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (_d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));
        let (_d3, mut rx_d3) = motorista_pronto(&state, ponto(-23.570, -46.650));

        criar_corrida(&state, "r10", &passageiro_conn).await;

        // Duas rodadas de um motorista cada; o terceiro nunca chega a ver
        // a corrida porque o limite de rodadas fala mais alto.
        let (evento, _) = proximo_evento(&mut rx_d1).await;
        assert_eq!(evento, "corrida_disponivel");
        let (evento, _) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "corrida_disponivel");

        let (evento, _) = proximo_evento(&mut rx_passageiro).await;
        assert_eq!(evento, "sem_motoristas");
        assert!(rx_d3.try_recv().is_err());
    }

    #[tokio::test]
    async fn aceitacoes_concorrentes_tem_um_so_vencedor() {
        let state = estado_de_teste(config_de_teste());
        let (passageiro_conn, _rx_passageiro) = passageiro(&state);
        let (d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r6", &passageiro_conn).await;

        let (_, dados_d1) = proximo_evento(&mut rx_d1).await;
        let (_, dados_d2) = proximo_evento(&mut rx_d2).await;

        let aceite_d1 = aceite("r6", dados_d1["offerId"].as_str().unwrap());
        let aceite_d2 = aceite("r6", dados_d2["offerId"].as_str().unwrap());
        let (estado_d1, conn_d1) = (state.clone(), d1.clone());
        let (estado_d2, conn_d2) = (state.clone(), d2.clone());
        let tarefa_d1 =
            tokio::spawn(async move { aceitar_corrida(estado_d1, &conn_d1, aceite_d1).await });
        let tarefa_d2 =
            tokio::spawn(async move { aceitar_corrida(estado_d2, &conn_d2, aceite_d2).await });
        let _ = tokio::join!(tarefa_d1, tarefa_d2);

        let mut vitorias = 0;
        for rx in [&mut rx_d1, &mut rx_d2] {
            while let Ok(mensagem) = rx.try_recv() {
                let axum::extract::ws::Message::Text(texto) = mensagem else {
                    continue;
                };
                let valor: serde_json::Value = serde_json::from_str(&texto).unwrap();
                if valor["evento"] == "offer_won" {
                    vitorias += 1;
                }
            }
        }
        assert_eq!(vitorias, 1);

        let ganhas = state
            .corridas
            .com_corrida("r6", |c| {
                assert_eq!(c.status, StatusCorrida::Aceita);
                c.ofertas
                    .values()
                    .filter(|o| o.estado == EstadoOferta::Ganha)
                    .count()
            })
            .unwrap();
        assert_eq!(ganhas, 1);
    }

    #[tokio::test]
    async fn oferta_encaminhada_nao_pode_ser_roubada() {
        let state = estado_de_teste(config_de_teste());
        let (passageiro_conn, _rx_passageiro) = passageiro(&state);
        let (_d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));
        let (d2, mut rx_d2) = motorista_pronto(&state, ponto(-23.560, -46.640));

        criar_corrida(&state, "r7", &passageiro_conn).await;

        let (_, dados_d1) = proximo_evento(&mut rx_d1).await;
        let (_, _) = proximo_evento(&mut rx_d2).await;

        // O segundo motorista tenta usar o offerId do primeiro.
        aceitar_corrida(
            state.clone(),
            &d2,
            aceite("r7", dados_d1["offerId"].as_str().unwrap()),
        )
        .await;

        let (evento, dados) = proximo_evento(&mut rx_d2).await;
        assert_eq!(evento, "offer_lost");
        assert_eq!(dados["reason"], "offer_invalid");
        let status = state.corridas.com_corrida("r7", |c| c.status).unwrap();
        assert_eq!(status, StatusCorrida::Procurando);
    }

    #[tokio::test]
    async fn corrida_tem_sempre_no_maximo_um_timer() {
        let state = estado_de_teste(config_de_teste());
        let (passageiro_conn, _rx_passageiro) = passageiro(&state);
        let (d1, mut rx_d1) = motorista_pronto(&state, ponto(-23.550, -46.634));

        criar_corrida(&state, "r8", &passageiro_conn).await;
        assert!(state
            .corridas
            .com_corrida("r8", |c| c.timer_leilao.is_some())
            .unwrap());

        let (_, dados) = proximo_evento(&mut rx_d1).await;
        aceitar_corrida(
            state.clone(),
            &d1,
            aceite("r8", dados["offerId"].as_str().unwrap()),
        )
        .await;

        // A saída de "procurando" cancela e solta o timer.
        assert!(state
            .corridas
            .com_corrida("r8", |c| c.timer_leilao.is_none())
            .unwrap());
    }
}
