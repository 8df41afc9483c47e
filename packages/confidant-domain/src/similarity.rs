use std::cmp::Ordering;

/// Cosine similarity in [-1, 1]. Mismatched dimensions or a zero-norm side score 0.0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	(dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Descending similarity, then most recent (higher sequence) first.
pub fn rank_order(a_score: f32, a_seq: i64, b_score: f32, b_seq: i64) -> Ordering {
	b_score.partial_cmp(&a_score).unwrap_or(Ordering::Equal).then_with(|| b_seq.cmp(&a_seq))
}
