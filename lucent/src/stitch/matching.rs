//! Brute-force Hamming matching with ratio test and cross-check.

use rayon::prelude::*;

use super::features::Descriptor;

/// Correspondence between `query[query]` and `train[train]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    /// Best distance must be below `ratio × second-best`.
    pub ratio: f32,
    pub max_distance: u32,
    pub cross_check: bool,
}

impl Matcher {
    pub fn new(ratio: f32, max_distance: u32) -> Self {
        Self {
            ratio,
            max_distance,
            cross_check: true,
        }
    }

    pub fn match_descriptors(
        &self,
        query: &[Descriptor],
        train: &[Descriptor],
    ) -> Vec<FeatureMatch> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }

        query
            .par_iter()
            .enumerate()
            .filter_map(|(query_idx, q)| {
                let (train_idx, distance, second) = nearest_two(q, train)?;
                if distance > self.max_distance {
                    return None;
                }
                if let Some(second) = second
                    && distance as f32 >= self.ratio * second as f32
                {
                    return None;
                }
                if self.cross_check
                    && nearest_two(&train[train_idx], query).map(|(idx, _, _)| idx)
                        != Some(query_idx)
                {
                    return None;
                }
                Some(FeatureMatch {
                    query: query_idx,
                    train: train_idx,
                    distance,
                })
            })
            .collect()
    }
}

/// Index and distance of the nearest descriptor, plus the second-nearest distance.
fn nearest_two(q: &Descriptor, train: &[Descriptor]) -> Option<(usize, u32, Option<u32>)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<u32> = None;

    for (idx, t) in train.iter().enumerate() {
        let distance = q.distance(t);
        match best {
            None => best = Some((idx, distance)),
            Some((_, best_dist)) if distance < best_dist => {
                second = Some(best_dist);
                best = Some((idx, distance));
            }
            Some(_) => {
                if second.is_none_or(|s| distance < s) {
                    second = Some(distance);
                }
            }
        }
    }

    best.map(|(idx, distance)| (idx, distance, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(word: u64) -> Descriptor {
        Descriptor([word, !word, word.rotate_left(17), word ^ 0x5555])
    }

    #[test]
    fn test_matches_identical_descriptors() {
        let query = vec![desc(1), desc(0xFFFF_0000), desc(0x1234_5678_9ABC)];
        let train = vec![desc(0x1234_5678_9ABC), desc(1), desc(0xFFFF_0000)];
        let mut matches = Matcher::new(0.8, 64).match_descriptors(&query, &train);
        matches.sort_by_key(|m| m.query);

        let pairs: Vec<(usize, usize)> = matches.iter().map(|m| (m.query, m.train)).collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
        assert!(matches.iter().all(|m| m.distance == 0));
    }

    #[test]
    fn test_ratio_test_drops_ambiguous_matches() {
        let query = vec![desc(7)];
        let train = vec![desc(7), desc(7)];
        assert!(Matcher::new(0.8, 64).match_descriptors(&query, &train).is_empty());
    }

    #[test]
    fn test_max_distance() {
        let query = vec![Descriptor([0; 4])];
        let train = vec![Descriptor([u64::MAX, 0, 0, 0])];
        assert!(Matcher::new(0.8, 63).match_descriptors(&query, &train).is_empty());
        assert_eq!(Matcher::new(0.8, 64).match_descriptors(&query, &train).len(), 1);
    }

    #[test]
    fn test_cross_check() {
        // Both queries prefer train[0]; only the closer one survives the reverse check.
        let query = vec![Descriptor([0b1, 0, 0, 0]), Descriptor([0b111, 0, 0, 0])];
        let train = vec![Descriptor([0, 0, 0, 0]), Descriptor([u64::MAX; 4])];
        let matches = Matcher::new(0.8, 64).match_descriptors(&query, &train);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].query, matches[0].train), (0, 0));

        let unchecked = Matcher {
            cross_check: false,
            ..Matcher::new(0.8, 64)
        };
        assert_eq!(unchecked.match_descriptors(&query, &train).len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        let d = vec![desc(3)];
        let matcher = Matcher::new(0.8, 64);
        assert!(matcher.match_descriptors(&[], &d).is_empty());
        assert!(matcher.match_descriptors(&d, &[]).is_empty());
    }
}
