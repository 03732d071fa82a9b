use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean over unmasked tokens followed by L2 normalization.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _time, hidden_dim) = hidden.dims3()?;

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?;
    let mask_broadcast = mask_3d.broadcast_as(hidden.shape())?;
    let masked = (hidden * &mask_broadcast)?;
    let sum = masked.sum(1)?;
    let eps_val = match hidden.dtype() { DType::F16 => 1e-6f64, _ => 1e-12f64 };
    // An all-zero mask row would otherwise divide by zero.
    let lengths = mask.sum_keepdim(1)?.to_dtype(sum.dtype())?.maximum(1.0)?;
    let mean = sum.broadcast_div(&lengths)?;
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps_val)?;
    let normalized = mean.broadcast_div(&norm)?;
    ensure!(normalized.dims() == [batch, hidden_dim].as_slice(), "unexpected pooled shape {:?}", normalized.dims());
    Ok(normalized)
}
