use crate::error::ApiError;
use crate::store::{FeedbackRow, Photo, ReactionKind, ReactionRow, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{instrument, warn};

/// A feedback entry as it appears in the feed, with its author resolved
#[derive(Debug, Clone, Serialize)]
pub struct FeedFeedback {
    pub id: i64,
    pub photo_id: i64,
    pub student_id: i64,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
    pub student_name: String,
}

/// A photo enriched with social metadata for the feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedPhoto {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub image_url: String,
    pub is_monthly_winner: bool,
    pub created_at: DateTime<Utc>,
    /// Histogram of reaction kinds on this photo
    pub reactions: HashMap<&'static str, i64>,
    /// The viewer's own reaction, if any
    pub my_reaction: Option<&'static str>,
    /// Feedback entries, newest first
    pub feedbacks: Vec<FeedFeedback>,
}

/// Produces the personalized photo feed for a viewer
///
/// Fans out to photos, reactions, feedback, and student names, then joins the
/// results in memory. Only the primary photo fetch is fatal; every other facet
/// degrades to "no data" so the feed still renders when a side table is
/// unreachable.
pub struct FeedAggregator {
    store: Arc<RecordStore>,
    fallback_name: String,
}

impl FeedAggregator {
    pub fn new(store: Arc<RecordStore>, fallback_name: String) -> Self {
        Self {
            store,
            fallback_name,
        }
    }

    /// Build the full feed for the given viewer
    #[instrument(skip(self))]
    pub async fn feed_for(&self, viewer_id: i64) -> Result<Vec<FeedPhoto>, ApiError> {
        let photos = self.store.list_photos().await?;

        let photo_ids: Vec<i64> = photos.iter().map(|p| p.id).collect();

        let (reactions, feedbacks) = if photo_ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let reactions = match self.store.list_reactions_for(&photo_ids).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "Reaction fetch failed; feed continues without reactions");
                    Vec::new()
                }
            };
            let feedbacks = match self.store.list_feedback_for(&photo_ids).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, "Feedback fetch failed; feed continues without feedback");
                    Vec::new()
                }
            };
            (reactions, feedbacks)
        };

        let student_ids = referenced_student_ids(&photos, &feedbacks);
        let names = match self.store.resolve_student_names(&student_ids).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Name resolution failed; feed falls back to default names");
                HashMap::new()
            }
        };

        Ok(merge_feed(
            photos,
            &reactions,
            feedbacks,
            &names,
            viewer_id,
            &self.fallback_name,
        ))
    }
}

/// Collect every student id referenced by the feed (photo owners + feedback authors)
fn referenced_student_ids(photos: &[Photo], feedbacks: &[FeedbackRow]) -> Vec<i64> {
    let mut ids: HashSet<i64> = photos.iter().map(|p| p.student_id).collect();
    ids.extend(feedbacks.iter().map(|f| f.student_id));
    ids.into_iter().collect()
}

/// Join photos with their reaction histograms, the viewer's own reactions,
/// and grouped feedback. Pure; ordering of `photos` and of `feedbacks` within
/// a group is preserved.
fn merge_feed(
    photos: Vec<Photo>,
    reactions: &[ReactionRow],
    feedbacks: Vec<FeedbackRow>,
    names: &HashMap<i64, String>,
    viewer_id: i64,
    fallback_name: &str,
) -> Vec<FeedPhoto> {
    let mut histograms: HashMap<i64, HashMap<&'static str, i64>> = HashMap::new();
    let mut my_reactions: HashMap<i64, &'static str> = HashMap::new();

    for row in reactions {
        // Rows with a kind outside the vocabulary are silently dropped
        let Some(kind) = ReactionKind::parse(&row.reaction) else {
            continue;
        };
        *histograms
            .entry(row.photo_id)
            .or_default()
            .entry(kind.as_str())
            .or_insert(0) += 1;
        if row.student_id == viewer_id {
            my_reactions.insert(row.photo_id, kind.as_str());
        }
    }

    let mut feedback_map: HashMap<i64, Vec<FeedFeedback>> = HashMap::new();
    for row in feedbacks {
        let student_name = resolve_name(names, row.student_id, fallback_name);
        feedback_map
            .entry(row.photo_id)
            .or_default()
            .push(FeedFeedback {
                id: row.id,
                photo_id: row.photo_id,
                student_id: row.student_id,
                feedback: row.feedback,
                created_at: row.created_at,
                student_name,
            });
    }

    photos
        .into_iter()
        .map(|photo| {
            let student_name = resolve_name(names, photo.student_id, fallback_name);
            FeedPhoto {
                student_name,
                reactions: histograms.remove(&photo.id).unwrap_or_default(),
                my_reaction: my_reactions.get(&photo.id).copied(),
                feedbacks: feedback_map.remove(&photo.id).unwrap_or_default(),
                id: photo.id,
                student_id: photo.student_id,
                image_url: photo.image_url,
                is_monthly_winner: photo.is_monthly_winner,
                created_at: photo.created_at,
            }
        })
        .collect()
}

fn resolve_name(names: &HashMap<i64, String>, student_id: i64, fallback: &str) -> String {
    names
        .get(&student_id)
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn photo(id: i64, student_id: i64) -> Photo {
        Photo {
            id,
            student_id,
            image_url: format!("https://cdn.example/photos/{id}.jpg"),
            feedback: None,
            is_monthly_winner: false,
            created_at: Utc::now(),
        }
    }

    fn reaction(photo_id: i64, student_id: i64, kind: &str) -> ReactionRow {
        ReactionRow {
            photo_id,
            student_id,
            reaction: kind.to_string(),
        }
    }

    fn feedback(id: i64, photo_id: i64, student_id: i64, text: &str) -> FeedbackRow {
        FeedbackRow {
            id,
            photo_id,
            student_id,
            feedback: text.to_string(),
            created_at: Utc::now() - Duration::minutes(id),
        }
    }

    #[test]
    fn test_photo_without_reactions_gets_empty_histogram() {
        let feed = merge_feed(
            vec![photo(1, 5)],
            &[],
            Vec::new(),
            &HashMap::new(),
            5,
            "Expert",
        );

        assert_eq!(feed.len(), 1);
        assert!(feed[0].reactions.is_empty());
        assert!(feed[0].my_reaction.is_none());
        assert!(feed[0].feedbacks.is_empty());
    }

    #[test]
    fn test_unknown_reaction_kinds_are_dropped() {
        let rows = vec![
            reaction(1, 2, "like"),
            reaction(1, 3, "dislike"),
            reaction(1, 4, "like"),
            reaction(1, 5, "wow"),
        ];
        let feed = merge_feed(
            vec![photo(1, 9)],
            &rows,
            Vec::new(),
            &HashMap::new(),
            3,
            "Expert",
        );

        let histogram = &feed[0].reactions;
        assert_eq!(histogram.get("like"), Some(&2));
        assert_eq!(histogram.get("wow"), Some(&1));
        assert!(!histogram.contains_key("dislike"));
        // Viewer 3's only reaction was invalid, so it never counts as theirs
        assert!(feed[0].my_reaction.is_none());
    }

    #[test]
    fn test_viewer_reaction_is_personalized() {
        let rows = vec![reaction(1, 5, "clap"), reaction(1, 6, "love")];
        let feed = merge_feed(
            vec![photo(1, 9)],
            &rows,
            Vec::new(),
            &HashMap::new(),
            5,
            "Expert",
        );

        assert_eq!(feed[0].my_reaction, Some("clap"));
    }

    #[test]
    fn test_single_photo_scenario() {
        // One photo by student 5, no reactions, one feedback by student 5,
        // viewed by student 5 whose name is "Ayşe"
        let mut names = HashMap::new();
        names.insert(5, "Ayşe".to_string());

        let feed = merge_feed(
            vec![photo(1, 5)],
            &[],
            vec![feedback(10, 1, 5, "Harika!")],
            &names,
            5,
            "Expert",
        );

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].student_name, "Ayşe");
        assert!(feed[0].reactions.is_empty());
        assert!(feed[0].my_reaction.is_none());
        assert_eq!(feed[0].feedbacks.len(), 1);
        assert_eq!(feed[0].feedbacks[0].student_name, "Ayşe");
        assert_eq!(feed[0].feedbacks[0].feedback, "Harika!");
    }

    #[test]
    fn test_missing_students_resolve_to_fallback() {
        let feed = merge_feed(
            vec![photo(1, 42)],
            &[],
            vec![feedback(10, 1, 99, "Güzel")],
            &HashMap::new(),
            5,
            "Expert",
        );

        assert_eq!(feed[0].student_name, "Expert");
        assert_eq!(feed[0].feedbacks[0].student_name, "Expert");
    }

    #[test]
    fn test_feedback_grouping_preserves_input_order() {
        // Store returns feedback newest-first; grouping must not reorder
        let feed = merge_feed(
            vec![photo(1, 5), photo(2, 6)],
            &[],
            vec![
                feedback(1, 1, 5, "newest"),
                feedback(2, 2, 5, "other photo"),
                feedback(3, 1, 6, "older"),
            ],
            &HashMap::new(),
            5,
            "Expert",
        );

        let first: Vec<&str> = feed[0]
            .feedbacks
            .iter()
            .map(|f| f.feedback.as_str())
            .collect();
        assert_eq!(first, vec!["newest", "older"]);
        assert_eq!(feed[1].feedbacks.len(), 1);
    }

    #[test]
    fn test_photo_order_is_preserved() {
        let feed = merge_feed(
            vec![photo(3, 1), photo(2, 1), photo(1, 1)],
            &[],
            Vec::new(),
            &HashMap::new(),
            1,
            "Expert",
        );

        let ids: Vec<i64> = feed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_referenced_student_ids_cover_owners_and_authors() {
        let photos = vec![photo(1, 5), photo(2, 6)];
        let feedbacks = vec![feedback(1, 1, 7, "x"), feedback(2, 2, 5, "y")];

        let mut ids = referenced_student_ids(&photos, &feedbacks);
        ids.sort_unstable();
        assert_eq!(ids, vec![5, 6, 7]);
    }
}
