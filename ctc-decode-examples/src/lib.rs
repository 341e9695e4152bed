//! Shared helpers for the decoding examples.

use candle::utils::{cuda_is_available, metal_is_available};
use candle::{Device, Result, Tensor};
use ctc_decode::DecodedPath;

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        Ok(Device::Cpu)
    }
}

/// Random unnormalized logits of shape `(time, batch, classes)`, suitable
/// for `decode_logits`.
pub fn random_logits<R: rand::Rng>(
    rng: &mut R,
    time: usize,
    batch: usize,
    classes: usize,
    device: &Device,
) -> Result<Tensor> {
    let data: Vec<f32> = (0..time * batch * classes)
        .map(|_| 4.0 * rng.random::<f32>())
        .collect();
    Tensor::from_vec(data, (time, batch, classes), device)
}

/// Render a decoded path as `cost  [l0 l1 ...]`.
pub fn format_path(path: &DecodedPath) -> String {
    let labels: Vec<String> = path.labels.iter().map(|l| l.to_string()).collect();
    format!("{:8.4}  [{}]", path.cost(), labels.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn random_logits_shape() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let t = random_logits(&mut rng, 3, 2, 5, &Device::Cpu)?;
        assert_eq!(t.dims(), [3, 2, 5]);
        Ok(())
    }

    #[test]
    fn format_path_shows_cost_first() {
        let path = DecodedPath {
            labels: vec![3, 1],
            log_prob: -2.0,
        };
        assert!(format_path(&path).contains("[3 1]"));
    }
}
