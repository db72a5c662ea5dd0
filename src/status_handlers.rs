// src/status_handlers.rs

use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::estado::AppState;

/// Verificação de vida do processo.
pub async fn pagina_inicial() -> &'static str {
    "OK"
}

/// Resumo operacional da central, para quem espreita de fora.
pub async fn estado_central(State(state): State<AppState>) -> Json<Value> {
    let (online, disponiveis) = state.motoristas.contagem();
    Json(json!({
        "motoristasOnline": online,
        "motoristasDisponiveis": disponiveis,
        "corridasAtivas": state.corridas.ativas(),
        "conexoes": state.conexoes.total(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estado::teste::{config_de_teste, estado_de_teste, motorista_pronto};
    use crate::geo::Coordenada;

    #[tokio::test]
    async fn resumo_conta_motoristas_e_conexoes() {
        let state = estado_de_teste(config_de_teste());
        let (_conn, _rx) = motorista_pronto(
            &state,
            Coordenada {
                latitude: -23.550,
                longitude: -46.633,
            },
        );

        let Json(resumo) = estado_central(State(state)).await;
        assert_eq!(resumo["motoristasOnline"], 1);
        assert_eq!(resumo["motoristasDisponiveis"], 1);
        assert_eq!(resumo["conexoes"], 1);
        assert_eq!(resumo["corridasAtivas"], 0);
    }
}
