// src/despacho_handlers.rs

//! # Gateway de conexões
//!
//! Gere o ciclo de vida de cada conexão WebSocket: identificação como
//! motorista ou passageiro, despacho dos eventos para o leilão e para o
//! registo de presença, e a retransmissão dos eventos de uma corrida em
//! curso (posição, chat, status) à sala respetiva.

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::conexoes::{sala_corrida, TipoConexao, SALA_PASSAGEIROS};
use crate::corridas::{self, StatusCorrida};
use crate::estado::AppState;
use crate::eventos::{
    evento_json, DisponibilidadeMotorista, EventoCliente, Identificacao, MensagemChat,
    MudancaStatus, NovaMensagem, PedidoCorrida, PosicaoMotorista, PosicaoNaCorrida,
    StatusAtualizado, StatusResposta, StatusViagem,
};
use crate::geo::Coordenada;
use crate::leilao;

#[debug_handler]
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| tratar_socket(socket, state))
}

/// Função auxiliar para gerir o ciclo de vida de uma conexão WebSocket.
async fn tratar_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel(32);
    let conn_id = Uuid::new_v4().to_string();
    state.conexoes.registar(conn_id.clone(), tx);
    println!("Nova conexão WebSocket: {}", conn_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(mensagem) = rx.recv().await {
            if sender.send(mensagem).await.is_err() {
                break;
            }
        }
    });

    let state_clone = state.clone();
    let conn_recv = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(mensagem)) = receiver.next().await {
            let Message::Text(texto) = mensagem else {
                continue;
            };
            // Nenhum evento malformado derruba a conexão: fica o registo e
            // segue-se para o próximo frame.
            match serde_json::from_str::<EventoCliente>(&texto) {
                Ok(evento) => tratar_evento(&state_clone, &conn_recv, evento).await,
                Err(erro) => {
                    eprintln!("Evento inválido na conexão {}: {}", conn_recv, erro);
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // A desconexão não cancela corridas: o motorista vencedor só fica
    // indisponível para ofertas novas.
    for corrida_id in state.corridas.corridas_do_vencedor(&conn_id) {
        println!(
            "⚠️ Motorista da corrida {} desconectou-se; a corrida continua ativa.",
            corrida_id
        );
    }
    if let Some(motorista) = state.motoristas.get(&conn_id) {
        state.motoristas.marcar_indisponivel(&conn_id);
        println!(
            "🚗 Motorista {} ({}) ficou indisponível ao desconectar.",
            conn_id,
            motorista.driver_id.as_deref().unwrap_or("sem id")
        );
    }
    state.conexoes.remover(&conn_id);
    println!("Conexão WebSocket {} fechada.", conn_id);
}

async fn tratar_evento(state: &AppState, conn_id: &str, evento: EventoCliente) {
    match evento {
        EventoCliente::Identificar(dados) => tratar_identificar(state, conn_id, dados).await,
        EventoCliente::DriverStatus(dados) => tratar_driver_status(state, conn_id, dados).await,
        EventoCliente::DriverLocalizacao(dados) => {
            tratar_driver_localizacao(state, conn_id, dados).await
        }
        EventoCliente::NovaCorrida(pedido) => tratar_nova_corrida(state, conn_id, pedido).await,
        EventoCliente::CorridaAceita(aceite) => {
            leilao::aceitar_corrida(state.clone(), conn_id, aceite).await
        }
        EventoCliente::EnviarMensagem(mensagem) => {
            tratar_enviar_mensagem(state, conn_id, mensagem).await
        }
        EventoCliente::CorridaStatus(mudanca) => {
            tratar_corrida_status(state, conn_id, mudanca).await
        }
    }
}

async fn tratar_identificar(state: &AppState, conn_id: &str, dados: Identificacao) {
    let resposta = match dados.tipo.as_str() {
        "motorista" => {
            state.conexoes.identificar(conn_id, TipoConexao::Motorista);
            state.motoristas.registar(conn_id, dados.driver_id);
            println!("🚗 Motorista identificado na conexão {}.", conn_id);
            StatusResposta::ok("motorista", state.config.quick_test_mode)
        }
        "passageiro" => {
            state.conexoes.identificar(conn_id, TipoConexao::Passageiro);
            state.conexoes.entrar_sala(SALA_PASSAGEIROS, conn_id);
            println!("🙋 Passageiro identificado na conexão {}.", conn_id);
            StatusResposta::ok("passageiro", state.config.quick_test_mode)
        }
        outro => {
            eprintln!(
                "Tipo de identificação inválido na conexão {}: {}",
                conn_id, outro
            );
            StatusResposta::erro("tipo_invalido")
        }
    };
    state
        .conexoes
        .emitir_para(conn_id, evento_json("status", &resposta))
        .await;
}

async fn tratar_driver_status(state: &AppState, conn_id: &str, dados: DisponibilidadeMotorista) {
    if state.conexoes.tipo_de(conn_id) != Some(TipoConexao::Motorista) {
        eprintln!(
            "driver_status de uma conexão que não é motorista ({}); ignorado.",
            conn_id
        );
        return;
    }
    state.motoristas.definir_disponivel(conn_id, dados.available);
    println!(
        "🔄 Motorista {} agora {}.",
        conn_id,
        if dados.available {
            "disponível"
        } else {
            "indisponível"
        }
    );
}

/// Telemetria do motorista: atualiza sempre a presença e, quando vem com
/// `rideId` de uma sala onde a conexão está, retransmite com carimbo.
async fn tratar_driver_localizacao(state: &AppState, conn_id: &str, dados: PosicaoMotorista) {
    let coordenada = Coordenada {
        latitude: dados.lat,
        longitude: dados.lng,
    };
    if !coordenada.valida() {
        eprintln!("Coordenadas inválidas da conexão {}; ignoradas.", conn_id);
        return;
    }

    let agora = Utc::now().timestamp_millis();
    state
        .motoristas
        .atualizar_localizacao(conn_id, coordenada, agora);

    let Some(corrida_id) = dados.ride_id else {
        return;
    };
    let sala = sala_corrida(&corrida_id);
    if !state.conexoes.membro_da_sala(&sala, conn_id) {
        return;
    }
    let retransmissao = PosicaoNaCorrida {
        ride_id: corrida_id,
        lat: dados.lat,
        lng: dados.lng,
        heading: dados.heading,
        speed: dados.speed,
        timestamp: agora,
    };
    state
        .conexoes
        .emitir_para_sala(&sala, evento_json("driver_localizacao", &retransmissao))
        .await;
}

async fn tratar_nova_corrida(state: &AppState, conn_id: &str, pedido: PedidoCorrida) {
    if state.conexoes.tipo_de(conn_id) != Some(TipoConexao::Passageiro) {
        eprintln!(
            "nova_corrida de uma conexão que não é passageiro ({}); ignorado.",
            conn_id
        );
        return;
    }
    if !pedido.pickup_location.valida() || !pedido.destination_location.valida() {
        eprintln!(
            "nova_corrida {} com coordenadas inválidas; ignorado.",
            pedido.ride_id
        );
        return;
    }

    let corrida_id = pedido.ride_id.clone();
    let corrida = corridas::Corrida::nova(&pedido, conn_id.to_string());
    if !state.corridas.criar(corrida) {
        eprintln!("Corrida {} já existe; pedido ignorado.", corrida_id);
        return;
    }
    state
        .conexoes
        .entrar_sala(&sala_corrida(&corrida_id), conn_id);
    println!(
        "🛎️ Nova corrida {} do passageiro {}.",
        corrida_id, pedido.passenger_name
    );

    leilao::despachar_corrida(state.clone(), corrida_id).await;
}

async fn tratar_enviar_mensagem(state: &AppState, conn_id: &str, mensagem: MensagemChat) {
    let sala = sala_corrida(&mensagem.ride_id);
    if !state.conexoes.membro_da_sala(&sala, conn_id) {
        eprintln!(
            "Mensagem para a corrida {} de quem não está na sala; ignorada.",
            mensagem.ride_id
        );
        return;
    }
    let difusao = NovaMensagem {
        from: mensagem.from,
        message: mensagem.message,
        timestamp: Utc::now().timestamp_millis(),
    };
    state
        .conexoes
        .emitir_para_sala(&sala, evento_json("nova_mensagem", &difusao))
        .await;
}

async fn tratar_corrida_status(state: &AppState, conn_id: &str, mudanca: MudancaStatus) {
    let sala = sala_corrida(&mudanca.ride_id);
    if !state.conexoes.membro_da_sala(&sala, conn_id) {
        eprintln!(
            "corrida_status para a corrida {} de quem não está na sala; ignorado.",
            mudanca.ride_id
        );
        return;
    }

    let atualizacao = StatusAtualizado {
        ride_id: mudanca.ride_id.clone(),
        by: mudanca.by,
        status: mudanca.status,
        timestamp: Utc::now().timestamp_millis(),
    };
    state
        .conexoes
        .emitir_para_sala(&sala, evento_json("corrida_status_atualizada", &atualizacao))
        .await;

    if !mudanca.status.encerra_corrida() {
        return;
    }

    let novo_status = match mudanca.status {
        StatusViagem::Completed => StatusCorrida::Concluida,
        _ => StatusCorrida::Cancelada,
    };
    let encerrada = state
        .corridas
        .com_corrida(&mudanca.ride_id, |c| match c.status {
            StatusCorrida::Falhada | StatusCorrida::Concluida | StatusCorrida::Cancelada => None,
            _ => {
                c.status = novo_status;
                c.cancelar_timer();
                c.expirar_pendentes();
                Some(c.vencedor_conn_id.clone())
            }
        })
        .flatten();

    if let Some(vencedor) = encerrada {
        match vencedor {
            Some(motorista) => println!(
                "🏁 Corrida {} encerrada; motorista {} liberto.",
                mudanca.ride_id, motorista
            ),
            None => println!(
                "🏁 Corrida {} encerrada antes de ter motorista.",
                mudanca.ride_id
            ),
        }
        corridas::agendar_limpeza(state.clone(), mudanca.ride_id);
    }
}
