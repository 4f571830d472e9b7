// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::common::NumStdDev;
use crate::cpc::cpc_confidence::{
    get_hip_confidence_ub, hip_confidence_lb, icon_confidence_lb, icon_confidence_ub,
};
use crate::cpc::icon_estimator::icon_estimate;

/// Tracks which cardinality estimator a sketch's state currently supports.
///
/// `Hip` is the streaming Historic Inverse Probability estimator, maintained
/// incrementally as coupons are observed; it is strictly better than ICON but
/// becomes invalid the moment a sketch is produced by a union, at which point
/// the sketch falls back to the post-hoc ICON estimator for the rest of its
/// life (`freeze_to_icon`).
#[derive(Debug, Clone)]
pub(crate) enum Estimator {
    Hip {
        kxp: f64,
        hip_estimate: f64,
        hip_err_accum: f64,
    },
    Icon,
}

impl Estimator {
    pub fn new_hip(lg_k: u8) -> Self {
        Estimator::Hip {
            kxp: (1u64 << lg_k) as f64,
            hip_estimate: 0.0,
            hip_err_accum: 0.0,
        }
    }

    pub fn is_hip(&self) -> bool {
        matches!(self, Estimator::Hip { .. })
    }

    pub fn kxp(&self) -> Option<f64> {
        match self {
            Estimator::Hip { kxp, .. } => Some(*kxp),
            Estimator::Icon => None,
        }
    }

    pub fn hip_estimate(&self) -> Option<f64> {
        match self {
            Estimator::Hip { hip_estimate, .. } => Some(*hip_estimate),
            Estimator::Icon => None,
        }
    }

    /// Advances the HIP accumulators for a newly observed coupon landing in
    /// column `col`. No-op once frozen to ICON.
    pub fn advance_hip(&mut self, lg_k: u8, col: u8) {
        if let Estimator::Hip {
            kxp,
            hip_estimate,
            hip_err_accum,
        } = self
        {
            let k = (1u64 << lg_k) as f64;
            let one_over_p = k / *kxp;
            *hip_estimate += one_over_p;
            *hip_err_accum += one_over_p * one_over_p - one_over_p;
            *kxp -= 2f64.powi(-(col as i32 + 1));
        }
    }

    /// Overwrites `kxp` with a value recomputed directly from the bit matrix,
    /// correcting drift that incremental decrementing cannot track across
    /// window shifts.
    pub fn refresh_kxp(&mut self, new_kxp: f64) {
        if let Estimator::Hip { kxp, .. } = self {
            *kxp = new_kxp;
        }
    }

    /// A union's result can never use HIP (the reference library disables it
    /// the moment a sketch did not arise from a single update stream).
    pub fn freeze_to_icon(&mut self) {
        *self = Estimator::Icon;
    }

    pub fn estimate(&self, lg_k: u8, num_coupons: u32) -> f64 {
        match self {
            Estimator::Hip { hip_estimate, .. } => {
                if num_coupons == 0 {
                    0.0
                } else {
                    *hip_estimate
                }
            }
            Estimator::Icon => icon_estimate(lg_k, num_coupons),
        }
    }

    pub fn lower_bound(&self, lg_k: u8, num_coupons: u32, kappa: NumStdDev) -> f64 {
        match self {
            Estimator::Hip { hip_estimate, .. } => {
                hip_confidence_lb(lg_k, num_coupons, *hip_estimate, kappa)
            }
            Estimator::Icon => icon_confidence_lb(lg_k, num_coupons, kappa),
        }
    }

    pub fn upper_bound(&self, lg_k: u8, num_coupons: u32, kappa: NumStdDev) -> f64 {
        match self {
            Estimator::Hip { hip_estimate, .. } => {
                get_hip_confidence_ub(lg_k, num_coupons, *hip_estimate, kappa)
            }
            Estimator::Icon => icon_confidence_ub(lg_k, num_coupons, kappa),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hip_advance_decreases_kxp() {
        let mut est = Estimator::new_hip(10);
        let before = est.kxp().unwrap();
        est.advance_hip(10, 3);
        assert!(est.kxp().unwrap() < before);
        assert!(est.hip_estimate().unwrap() > 0.0);
    }

    #[test]
    fn test_freeze_disables_hip() {
        let mut est = Estimator::new_hip(10);
        est.advance_hip(10, 0);
        est.freeze_to_icon();
        assert!(!est.is_hip());
        assert_eq!(est.estimate(10, 1), icon_estimate(10, 1));
    }
}
