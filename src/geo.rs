// src/geo.rs

use serde::{Deserialize, Serialize};

const RAIO_TERRA_KM: f64 = 6371.0;

/// Distância devolvida quando falta a posição de um dos lados.
pub const DISTANCIA_SENTINELA_KM: f64 = 9999.0;

/// Um ponto geográfico em graus decimais.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordenada {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordenada {
    /// Coordenadas com valores não finitos (NaN, infinito) são inválidas.
    pub fn valida(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Distância de círculo máximo (Haversine) entre dois pontos, em quilómetros.
/// Devolve [`DISTANCIA_SENTINELA_KM`] quando falta qualquer um dos pontos.
pub fn distancia_km(a: Option<&Coordenada>, b: Option<&Coordenada>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return DISTANCIA_SENTINELA_KM;
    };

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    RAIO_TERRA_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distancia_entre_pontos_de_sao_paulo() {
        let se = Coordenada {
            latitude: -23.550,
            longitude: -46.633,
        };
        let pinheiros = Coordenada {
            latitude: -23.561,
            longitude: -46.702,
        };

        let d = distancia_km(Some(&se), Some(&pinheiros));
        // Cerca de 7 km entre a Sé e Pinheiros
        assert!(d > 5.0 && d < 10.0, "distância fora do esperado: {}", d);
    }

    #[test]
    fn distancia_zero_para_o_mesmo_ponto() {
        let p = Coordenada {
            latitude: -23.550,
            longitude: -46.633,
        };
        assert!(distancia_km(Some(&p), Some(&p)) < 1e-9);
    }

    #[test]
    fn sentinela_quando_falta_um_ponto() {
        let p = Coordenada {
            latitude: -23.550,
            longitude: -46.633,
        };
        assert_eq!(distancia_km(None, Some(&p)), DISTANCIA_SENTINELA_KM);
        assert_eq!(distancia_km(Some(&p), None), DISTANCIA_SENTINELA_KM);
        assert_eq!(distancia_km(None, None), DISTANCIA_SENTINELA_KM);
    }

    #[test]
    fn coordenadas_nao_finitas_sao_invalidas() {
        assert!(!Coordenada {
            latitude: f64::NAN,
            longitude: -46.633
        }
        .valida());
        assert!(!Coordenada {
            latitude: -23.550,
            longitude: f64::INFINITY
        }
        .valida());
        assert!(Coordenada {
            latitude: -23.550,
            longitude: -46.633
        }
        .valida());
    }
}
