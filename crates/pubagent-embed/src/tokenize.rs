use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Tokenize a batch, truncating and padding every row to exactly `max_len`
/// so a text's tensor shape never depends on its batch neighbours.
///
/// Returns `(input_ids, attention_mask)`, both `[B, max_len]`.
pub fn tokenize_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let pad_id = tokenizer.get_padding().map_or(0, |p| p.pad_id);
    let mut ids = Vec::with_capacity(texts.len() * max_len);
    let mut mask = Vec::with_capacity(texts.len() * max_len);
    for text in texts {
        let enc = tokenizer.encode(text.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        let mut row_ids = enc.get_ids().to_vec();
        let mut row_mask = enc.get_attention_mask().to_vec();
        row_ids.truncate(max_len);
        row_mask.truncate(max_len);
        row_ids.resize(max_len, pad_id);
        row_mask.resize(max_len, 0);
        ids.extend(row_ids);
        mask.extend(row_mask);
    }
    let input_ids = Tensor::from_vec(ids, (texts.len(), max_len), device)?;
    let attention_mask = Tensor::from_vec(mask, (texts.len(), max_len), device)?;
    Ok((input_ids, attention_mask))
}
