use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TariffId {
    Agile,
    Cosy,
    Go,
}

impl TariffId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TariffId::Agile => "agile",
            TariffId::Cosy => "cosy",
            TariffId::Go => "go",
        }
    }
}

impl fmt::Display for TariffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the tariffs the switcher knows how to price and switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffCandidate {
    pub id: TariffId,
    pub display_name: &'static str,
    /// Substring that identifies this tariff inside an upstream tariff code,
    /// e.g. `E-1R-AGILE-24-10-01-A`.
    pub tariff_code_matcher: &'static str,
}

pub const TARIFFS: [TariffCandidate; 3] = [
    TariffCandidate {
        id: TariffId::Agile,
        display_name: "Agile Octopus",
        tariff_code_matcher: "-AGILE-",
    },
    TariffCandidate {
        id: TariffId::Cosy,
        display_name: "Cosy Octopus",
        tariff_code_matcher: "-COSY-",
    },
    TariffCandidate {
        id: TariffId::Go,
        display_name: "Octopus Go",
        tariff_code_matcher: "-GO-",
    },
];

impl TariffCandidate {
    /// First candidate whose matcher is contained in `tariff_code`.
    pub fn for_tariff_code(tariff_code: &str) -> Option<&'static TariffCandidate> {
        TARIFFS
            .iter()
            .find(|t| tariff_code.contains(t.tariff_code_matcher))
    }

    pub fn by_id(id: TariffId) -> &'static TariffCandidate {
        match id {
            TariffId::Agile => &TARIFFS[0],
            TariffId::Cosy => &TARIFFS[1],
            TariffId::Go => &TARIFFS[2],
        }
    }
}
