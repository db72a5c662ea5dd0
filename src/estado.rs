// src/estado.rs

use crate::conexoes::ConexoesState;
use crate::config::Config;
use crate::corridas::CorridasState;
use crate::motoristas::MotoristasState;

/// Representa o estado partilhado da aplicação.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub conexoes: ConexoesState,
    pub motoristas: MotoristasState,
    pub corridas: CorridasState,
}

impl AppState {
    pub fn nova(config: Config) -> Self {
        Self {
            config,
            conexoes: ConexoesState::default(),
            motoristas: MotoristasState::default(),
            corridas: CorridasState::default(),
        }
    }
}
