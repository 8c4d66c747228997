//! Similitud coseno y re-ranking por Maximal Marginal Relevance (MMR).
//!
//! MMR = λ × sim(query, doc) - (1-λ) × max(sim(doc, seleccionados))
//!
//! λ = 1.0 equivale a búsqueda por relevancia pura; λ = 0.0 sólo premia diversidad.

pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Similitud coseno; 0.0 si alguno de los vectores es nulo.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let (na, nb) = (l2_norm(a), l2_norm(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (na * nb)
}

/// Selecciona hasta `k` índices de `candidates` por MMR, en orden de selección.
///
/// El primero elegido es siempre el más similar a la query. Los empates se
/// resuelven a favor del candidato con menor índice.
pub fn mmr_select(query: &[f64], candidates: &[Vec<f64>], k: usize, lambda: f64) -> Vec<usize> {
    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    let relevance: Vec<f64> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&candidates[idx], &candidates[s]))
                .fold(f64::NEG_INFINITY, f64::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((pos, score));
            }
        }
        let Some((pos, _)) = best else {
            break;
        };
        selected.push(remaining.remove(pos));
    }

    selected
}
