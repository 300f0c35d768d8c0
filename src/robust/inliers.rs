/// Inliers of a robust estimation solution
#[derive(Debug, Clone, PartialEq)]
pub struct InliersData {
    /// One flag per sample, true for inliers
    pub mask: Vec<bool>,
    /// Number of inliers
    pub num_inliers: usize,
    /// Residual of each sample, when kept
    pub residuals: Option<Vec<f64>>,
    /// Threshold used to classify the samples. Fixed for RANSAC, MSAC and PROSAC,
    /// deduced from the median residual for LMedS and PROMedS.
    pub threshold: f64,
}

impl InliersData {
    /// Classifies `residuals` with `threshold`
    pub(crate) fn classify(residuals: &[f64], threshold: f64) -> Self {
        let mask = residuals
            .iter()
            .map(|r| r.is_finite() && *r <= threshold)
            .collect::<Vec<_>>();

        let num_inliers = mask.iter().filter(|inlier| **inlier).count();

        Self {
            mask,
            num_inliers,
            threshold,
            residuals: Some(residuals.to_vec()),
        }
    }

    /// Indices of the inlier samples
    pub fn indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, inlier)| if *inlier { Some(i) } else { None })
            .collect()
    }

    /// True if sample `index` is an inlier
    pub fn is_inlier(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }
}
