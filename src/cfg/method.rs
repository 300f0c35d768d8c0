use crate::prelude::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Robust estimation method
#[allow(non_camel_case_types)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Method {
    /// RANdom SAmple Consensus: uniform sampling, samples are
    /// inliers when their residual lies below a fixed threshold.
    /// The model with the largest consensus wins.
    Ransac,

    /// Least Median of Squares: uniform sampling, the model minimizing
    /// the median of squared residuals wins. No threshold is required:
    /// it is deduced from the median itself. Tolerates up to 50% outliers.
    #[default]
    LMedS,

    /// M-estimator SAmple Consensus: like [Method::Ransac], but each
    /// sample contributes its truncated squared residual to the model cost.
    /// Samples past the threshold contribute a constant penalty.
    Msac,

    /// PROgressive SAmple Consensus: [Method::Ransac] scoring, but samples
    /// are drawn from a pool of best quality samples, progressively
    /// growing to the whole population. Requires quality scores.
    Prosac,

    /// PROgressive least Median of Squares: [Method::Prosac] sampling,
    /// [Method::LMedS] scoring. Requires quality scores.
    PROMedS,
}

impl Method {
    /// True when this [Method] requires quality scores.
    pub fn requires_quality_scores(&self) -> bool {
        matches!(self, Self::Prosac | Self::PROMedS)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ransac => write!(fmt, "RANSAC"),
            Self::LMedS => write!(fmt, "LMedS"),
            Self::Msac => write!(fmt, "MSAC"),
            Self::Prosac => write!(fmt, "PROSAC"),
            Self::PROMedS => write!(fmt, "PROMedS"),
        }
    }
}

impl std::str::FromStr for Method {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ransac" => Ok(Self::Ransac),
            "lmeds" => Ok(Self::LMedS),
            "msac" => Ok(Self::Msac),
            "prosac" => Ok(Self::Prosac),
            "promeds" => Ok(Self::PROMedS),
            _ => Err(Error::UnknownMethod),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Method;
    use std::str::FromStr;

    #[test]
    fn method_parsing() {
        for method in [
            Method::Ransac,
            Method::LMedS,
            Method::Msac,
            Method::Prosac,
            Method::PROMedS,
        ] {
            let parsed = Method::from_str(&method.to_string()).unwrap();
            assert_eq!(parsed, method);
        }
        assert!(Method::from_str("least squares").is_err());
        assert_eq!(Method::from_str(" PROSAC ").unwrap(), Method::Prosac);
    }
}
