//! Decoding of dense probability vectors into ranked tag lists

use ndarray::Array2;

use crate::constants::NUM_TAGS;
use crate::error::{TaggerError, TaggerResult};
use crate::tags::TagVocabulary;

/// Turns per-tag probability vectors into ranked (tag, score) lists.
///
/// The vocabulary is owned explicitly; nothing here reads global state.
pub struct PredictionDecoder {
    vocab: TagVocabulary,
}

impl PredictionDecoder {
    pub fn new(vocab: TagVocabulary) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.vocab
    }

    /// Decodes a single probability vector.
    ///
    /// Values are paired with the vocabulary by position and sorted
    /// descending; the sort is stable, so ties keep vocabulary order.
    ///
    /// # Arguments
    ///
    /// * `prediction` - Exactly 50 per-tag probabilities.
    /// * `top_n` - How many entries to keep, within [0, 50].
    ///
    /// # Returns
    ///
    /// * The `top_n` highest-scoring (tag, probability) pairs, descending.
    pub fn decode(&self, prediction: &[f32], top_n: usize) -> TaggerResult<Vec<(&str, f32)>> {
        if top_n > NUM_TAGS {
            return Err(TaggerError::TopNOutOfRange { got: top_n });
        }
        if prediction.len() != NUM_TAGS {
            return Err(TaggerError::WrongVectorLength {
                got: prediction.len(),
            });
        }

        let mut ranked: Vec<(&str, f32)> = self
            .vocab
            .iter()
            .zip(prediction.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_n);
        Ok(ranked)
    }

    /// Decodes a batch of probability vectors, one ranked list per row.
    pub fn decode_batch(
        &self,
        predictions: &Array2<f32>,
        top_n: usize,
    ) -> TaggerResult<Vec<Vec<(&str, f32)>>> {
        let mut decoded = Vec::with_capacity(predictions.nrows());
        for row in predictions.rows() {
            let values: Vec<f32> = row.iter().copied().collect();
            decoded.push(self.decode(&values, top_n)?);
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn decoder() -> PredictionDecoder {
        PredictionDecoder::new(TagVocabulary::last_fm())
    }

    fn rising_vector() -> Vec<f32> {
        // probabilities strictly increase with index, so "happy" (49) wins
        (0..NUM_TAGS).map(|i| i as f32 / NUM_TAGS as f32).collect()
    }

    #[test]
    fn highest_probability_tag_comes_first() {
        let decoder = decoder();
        let mut pred = vec![0.1f32; NUM_TAGS];
        pred[0] = 0.9; // "rock"
        for top_n in 1..=NUM_TAGS {
            let ranked = decoder.decode(&pred, top_n).unwrap();
            assert_eq!(ranked[0].0, "rock");
            assert_eq!(ranked.len(), top_n);
        }
    }

    #[test]
    fn top_n_zero_is_an_empty_list_not_an_error() {
        let decoder = decoder();
        let ranked = decoder.decode(&rising_vector(), 0).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn top_n_fifty_returns_all_tags_in_descending_order() {
        let decoder = decoder();
        let ranked = decoder.decode(&rising_vector(), NUM_TAGS).unwrap();
        assert_eq!(ranked.len(), NUM_TAGS);
        assert_eq!(ranked[0].0, "happy");
        assert_eq!(ranked[NUM_TAGS - 1].0, "rock");
        for pair in ranked.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn ties_keep_vocabulary_order() {
        let decoder = decoder();
        let pred = vec![0.5f32; NUM_TAGS];
        let ranked = decoder.decode(&pred, 3).unwrap();
        assert_eq!(ranked[0].0, "rock");
        assert_eq!(ranked[1].0, "pop");
        assert_eq!(ranked[2].0, "alternative");
    }

    #[test]
    fn wrong_vector_length_is_a_precondition_violation() {
        for len in [49usize, 51] {
            let pred = vec![0.5f32; len];
            assert!(matches!(
                decoder().decode(&pred, 5),
                Err(TaggerError::WrongVectorLength { got }) if got == len
            ));
        }
    }

    #[test]
    fn top_n_above_fifty_is_rejected() {
        assert!(matches!(
            decoder().decode(&rising_vector(), 51),
            Err(TaggerError::TopNOutOfRange { got: 51 })
        ));
    }

    #[test]
    fn batch_decoding_ranks_each_row_independently() {
        let mut values = vec![0.1f32; NUM_TAGS * 2];
        values[0] = 0.9; // row 0: "rock"
        values[NUM_TAGS + 9] = 0.9; // row 1: "jazz"
        let preds = Array2::from_shape_vec((2, NUM_TAGS), values).unwrap();

        let decoder = decoder();
        let ranked = decoder.decode_batch(&preds, 1).unwrap();
        assert_eq!(ranked[0][0].0, "rock");
        assert_eq!(ranked[1][0].0, "jazz");
    }

    #[test]
    fn batch_with_wrong_width_is_rejected() {
        let preds = Array2::<f32>::zeros((2, 49));
        assert!(matches!(
            decoder().decode_batch(&preds, 5),
            Err(TaggerError::WrongVectorLength { got: 49 })
        ));
    }
}
