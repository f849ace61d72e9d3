//! Score composer
//!
//! final = 0.5 * content + 0.3 * collaborative + 0.2 * engagement
//!       (+ visual_weight * visual when a vector index is configured)
//!
//! One pass over the corpus, then a stable descending sort so equal scores
//! keep corpus order, then truncation.

use super::{AffinityProfile, CollaborativeScores, VisualScores};
use crate::models::{Post, ScoredPost};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub content: f64,
    pub collaborative: f64,
    pub engagement: f64,
    pub visual: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            content: 0.5,
            collaborative: 0.3,
            engagement: 0.2,
            visual: 0.0,
        }
    }
}

/// Per-request signals. `engagement` is aligned with the corpus passed to
/// [`ScoreComposer::compose`].
pub struct Signals<'a> {
    pub profile: &'a AffinityProfile,
    pub collaborative: &'a CollaborativeScores,
    pub engagement: &'a [f64],
    pub visual: Option<&'a VisualScores>,
}

pub struct ScoreComposer {
    weights: ScoreWeights,
    limit: usize,
}

impl ScoreComposer {
    pub fn new(weights: ScoreWeights, limit: usize) -> Self {
        Self { weights, limit }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn final_score(&self, content: f64, collaborative: f64, engagement: f64, visual: f64) -> f64 {
        let mut score = self.weights.content * content
            + self.weights.collaborative * collaborative
            + self.weights.engagement * engagement;
        if self.weights.visual != 0.0 {
            score += self.weights.visual * visual;
        }
        score
    }

    pub fn compose(&self, posts: Vec<Post>, signals: &Signals<'_>) -> Vec<ScoredPost> {
        let mut scored: Vec<(Post, f64)> = posts
            .into_iter()
            .enumerate()
            .map(|(i, post)| {
                let engagement = signals.engagement.get(i).copied().unwrap_or(0.0);
                let visual = signals.visual.map_or(0.0, |v| v.score(&post.id));
                let score = self.final_score(
                    signals.profile.content_score(&post),
                    signals.collaborative.score(&post.id),
                    engagement,
                    visual,
                );
                (post, score)
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.limit);

        scored
            .into_iter()
            .map(|(post, score)| ScoredPost::from_post(post, score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityEvent;
    use crate::services::ResolvedActivity;
    use chrono::Utc;
    use std::collections::HashMap;

    fn empty_signals<'a>(
        profile: &'a AffinityProfile,
        collaborative: &'a CollaborativeScores,
        engagement: &'a [f64],
    ) -> Signals<'a> {
        Signals {
            profile,
            collaborative,
            engagement,
            visual: None,
        }
    }

    #[test]
    fn test_literal_weights() {
        let composer = ScoreComposer::new(ScoreWeights::default(), 100);
        let score = composer.final_score(2.0, 3.0, 0.5, 99.0);
        assert!((score - (0.5 * 2.0 + 0.3 * 3.0 + 0.2 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_sorted_descending_and_truncated() {
        let posts: Vec<Post> = (0..150).map(|i| Post::new(format!("p{i}"), "o")).collect();
        let engagement: Vec<f64> = (0..150).map(|i| (i % 7) as f64).collect();
        let profile = AffinityProfile::default();
        let collaborative = CollaborativeScores::default();

        let ranked = ScoreComposer::new(ScoreWeights::default(), 100)
            .compose(posts, &empty_signals(&profile, &collaborative, &engagement));

        assert_eq!(ranked.len(), 100);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        let posts = vec![
            Post::new("a", "o"),
            Post::new("b", "o"),
            Post::new("c", "o"),
        ];
        let engagement = vec![0.0, 1.0, 0.0];
        let profile = AffinityProfile::default();
        let collaborative = CollaborativeScores::default();

        let ranked = ScoreComposer::new(ScoreWeights::default(), 100)
            .compose(posts, &empty_signals(&profile, &collaborative, &engagement));
        let ids: Vec<&str> = ranked.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_all_signals_combine() {
        let post = Post::new("p1", "o").with_tags(["boho"]);
        let activity = ResolvedActivity {
            events: vec![ActivityEvent::new("u", "p1", Utc::now())],
            posts: HashMap::from([("p1".to_string(), post.clone())]),
        };
        let profile = AffinityProfile::from_activity(&activity);
        let collaborative = CollaborativeScores::from_events(&[
            ActivityEvent::new("peer", "p1", Utc::now()),
            ActivityEvent::new("peer", "p1", Utc::now()),
        ]);
        let engagement = vec![0.5];

        let ranked = ScoreComposer::new(ScoreWeights::default(), 100)
            .compose(vec![post], &empty_signals(&profile, &collaborative, &engagement));

        assert!((ranked[0].score - (0.5 * 1.0 + 0.3 * 2.0 + 0.2 * 0.5)).abs() < 1e-12);
    }
}
