//! ACF/PACF model-order recommendations.
//!
//! The server tags each recommendation with `"type": "ARIMA" | "SARIMA"`;
//! only the SARIMA variant carries a seasonal order.

use serde::{Deserialize, Serialize};

use crate::api::lenient;
use crate::api::types::SarimaxParams;

/// Which variant of the series an analysis was run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesType {
    Original,
    Smoothed,
    Log,
    Diff,
}

impl SeriesType {
    pub const ALL: [SeriesType; 4] = [
        SeriesType::Original,
        SeriesType::Smoothed,
        SeriesType::Log,
        SeriesType::Diff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesType::Original => "original",
            SeriesType::Smoothed => "smoothed",
            SeriesType::Log => "log",
            SeriesType::Diff => "diff",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SeriesType::Original => "original series",
            SeriesType::Smoothed => "smoothed series",
            SeriesType::Log => "log-transformed series",
            SeriesType::Diff => "differenced series",
        }
    }
}

impl std::str::FromStr for SeriesType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" => Ok(SeriesType::Original),
            "smoothed" => Ok(SeriesType::Smoothed),
            "log" => Ok(SeriesType::Log),
            "diff" => Ok(SeriesType::Diff),
            other => Err(format!(
                "Unknown series type '{}'. Expected original, smoothed, log or diff",
                other
            )),
        }
    }
}

/// Transforms the analysis suggests before fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSuggestion {
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub suggest_differencing: bool,
    #[serde(default)]
    pub differencing_order: Option<u32>,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub suggest_smoothing: bool,
    #[serde(default)]
    pub recommended_smoothing_window: Option<u32>,
}

impl TransformSuggestion {
    /// Human-readable list of suggested transforms. `d` is the recommended
    /// differencing order, used when the suggestion omits its own.
    pub fn describe(&self, d: u32) -> String {
        let mut parts = Vec::new();
        if self.suggest_differencing {
            parts.push(format!("Differencing d={}", self.differencing_order.unwrap_or(d)));
        }
        if self.suggest_smoothing {
            if let Some(window) = self.recommended_smoothing_window {
                parts.push(format!("Smoothing (window {})", window));
            }
        }
        if parts.is_empty() {
            "No additional transform suggested".to_string()
        } else {
            parts.join(" and ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Recommendation {
    #[serde(rename = "ARIMA")]
    Arima {
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        p: u32,
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        d: u32,
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        q: u32,
        #[serde(default)]
        transform_suggestion: TransformSuggestion,
    },
    #[serde(rename = "SARIMA")]
    Sarima {
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        p: u32,
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        d: u32,
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        q: u32,
        #[serde(rename = "P", default, deserialize_with = "lenient::u32_or_zero")]
        seasonal_p: u32,
        #[serde(rename = "D", default, deserialize_with = "lenient::u32_or_zero")]
        seasonal_d: u32,
        #[serde(rename = "Q", default, deserialize_with = "lenient::u32_or_zero")]
        seasonal_q: u32,
        #[serde(default, deserialize_with = "lenient::u32_or_zero")]
        m: u32,
        #[serde(default)]
        transform_suggestion: TransformSuggestion,
    },
}

impl Recommendation {
    /// Non-seasonal `(p, d, q)`.
    pub fn order(&self) -> (u32, u32, u32) {
        match self {
            Recommendation::Arima { p, d, q, .. } | Recommendation::Sarima { p, d, q, .. } => {
                (*p, *d, *q)
            }
        }
    }

    /// Seasonal `(P, D, Q, m)`, all zero for ARIMA.
    pub fn seasonal_order(&self) -> (u32, u32, u32, u32) {
        match self {
            Recommendation::Arima { .. } => (0, 0, 0, 0),
            Recommendation::Sarima {
                seasonal_p,
                seasonal_d,
                seasonal_q,
                m,
                ..
            } => (*seasonal_p, *seasonal_d, *seasonal_q, *m),
        }
    }

    pub fn transform_suggestion(&self) -> &TransformSuggestion {
        match self {
            Recommendation::Arima { transform_suggestion, .. }
            | Recommendation::Sarima { transform_suggestion, .. } => transform_suggestion,
        }
    }

    pub fn label(&self) -> String {
        let (p, d, q) = self.order();
        match self {
            Recommendation::Arima { .. } => format!("ARIMA({}, {}, {})", p, d, q),
            Recommendation::Sarima { .. } => {
                let (sp, sd, sq, m) = self.seasonal_order();
                format!("SARIMA({}, {}, {})({}, {}, {}, {})", p, d, q, sp, sd, sq, m)
            }
        }
    }

    /// Copy the suggested orders into fit parameters, leaving trend and
    /// estimation options untouched.
    pub fn apply_to(&self, params: &mut SarimaxParams) {
        let (p, d, q) = self.order();
        let (sp, sd, sq, m) = self.seasonal_order();
        params.p = p;
        params.d = d;
        params.q = q;
        params.seasonal_p = sp;
        params.seasonal_d = sd;
        params.seasonal_q = sq;
        params.m = m;
    }
}

/// Analyses run so far for the active file, one slot per series variant.
/// Sent with every fit so the server can persist them on the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcfPacfAnalysisSet {
    #[serde(default)]
    pub original: Option<Recommendation>,
    #[serde(default)]
    pub smoothed: Option<Recommendation>,
    #[serde(default)]
    pub log: Option<Recommendation>,
    #[serde(default)]
    pub diff: Option<Recommendation>,
}

impl AcfPacfAnalysisSet {
    pub fn get(&self, series: SeriesType) -> Option<&Recommendation> {
        match series {
            SeriesType::Original => self.original.as_ref(),
            SeriesType::Smoothed => self.smoothed.as_ref(),
            SeriesType::Log => self.log.as_ref(),
            SeriesType::Diff => self.diff.as_ref(),
        }
    }

    pub fn set(&mut self, series: SeriesType, recommendation: Option<Recommendation>) {
        let slot = match series {
            SeriesType::Original => &mut self.original,
            SeriesType::Smoothed => &mut self.smoothed,
            SeriesType::Log => &mut self.log,
            SeriesType::Diff => &mut self.diff,
        };
        *slot = recommendation;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        SeriesType::ALL.iter().all(|s| self.get(*s).is_none())
    }
}
