//! Constant-velocity Kalman filter over the XYAH box parameterization.
//!
//! State is `[cx, cy, a, h, vcx, vcy, va, vh]`; the measurement is the first
//! four components.

use nalgebra::{SMatrix, SVector};

use crate::error::TrackError;

pub type StateMean = SVector<f64, 8>;
pub type StateCovariance = SMatrix<f64, 8, 8>;
pub type Measurement = SVector<f64, 4>;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f64, 8, 8>,
    update_mat: SMatrix<f64, 4, 8>,
    std_weight_position: f64,
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn diagonal<const N: usize>(std: [f64; N]) -> SMatrix<f64, N, N> {
    SMatrix::from_diagonal(&SVector::from_iterator(std.iter().map(|s| s * s)))
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = SMatrix::<f64, 8, 8>::identity();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
        }

        let mut update_mat = SMatrix::<f64, 4, 8>::zeros();
        for i in 0..4 {
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Build a measurement vector from an `[cx, cy, a, h]` box.
    pub fn measurement(xyah: [f32; 4]) -> Measurement {
        Measurement::new(
            xyah[0] as f64,
            xyah[1] as f64,
            xyah[2] as f64,
            xyah[3] as f64,
        )
    }

    /// Create a track state from an unassociated measurement.
    pub fn initiate(&self, measurement: &Measurement) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(measurement);

        let h = measurement[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let covariance = diagonal([
            2.0 * pos,
            2.0 * pos,
            1e-2,
            2.0 * pos,
            10.0 * vel,
            10.0 * vel,
            1e-5,
            10.0 * vel,
        ]);

        (mean, covariance)
    }

    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let vel = self.std_weight_velocity * h;
        let motion_cov = diagonal([pos, pos, 1e-2, pos, vel, vel, 1e-5, vel]);

        let new_mean = self.motion_mat * mean;
        let new_covariance =
            self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;

        (new_mean, new_covariance)
    }

    /// Project the state distribution into measurement space.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
    ) -> (Measurement, SMatrix<f64, 4, 4>) {
        let h = mean[3];
        let pos = self.std_weight_position * h;
        let innovation_cov = diagonal([pos, pos, 1e-1, pos]);

        let mean_proj = self.update_mat * mean;
        let covariance_proj =
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov;

        (mean_proj, covariance_proj)
    }

    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: &Measurement,
    ) -> Result<(StateMean, StateCovariance), TrackError> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let s_inv = projected_cov
            .try_inverse()
            .ok_or(TrackError::SingularCovariance)?;

        // K = P * H^T * S^-1
        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;
        let innovation = measurement - projected_mean;

        let new_mean = mean + kalman_gain * innovation;
        let new_covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();

        Ok((new_mean, new_covariance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate(&Measurement::new(100.0, 200.0, 0.5, 50.0));
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[4], 0.0);
        assert!(cov[(0, 0)] > 0.0);
    }

    #[test]
    fn test_update_pulls_towards_measurement() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate(&Measurement::new(100.0, 100.0, 1.0, 50.0));
        let (mean, cov) = kf.predict(&mean, &cov);
        let (updated, _) = kf
            .update(&mean, &cov, &Measurement::new(110.0, 100.0, 1.0, 50.0))
            .unwrap();
        assert!(updated[0] > 100.0 && updated[0] <= 110.0);
        // positive x velocity is picked up from the innovation
        assert!(updated[4] > 0.0);
    }

    #[test]
    fn test_predict_follows_velocity() {
        let kf = KalmanFilter::new();
        let (mut mean, cov) = kf.initiate(&Measurement::new(100.0, 100.0, 1.0, 50.0));
        mean[4] = 5.0;
        let (predicted, _) = kf.predict(&mean, &cov);
        assert!((predicted[0] - 105.0).abs() < 1e-9);
    }
}
