use serde::{Deserialize, Serialize};

/// Losses of a single optimizer step, already multiplied by their weights.
#[derive(Debug, Clone, Copy)]
pub struct StepStats {
    pub content_loss: f32,
    pub style_loss: f32,
    pub batch_size: usize,
}

impl StepStats {
    pub fn total_loss(&self) -> f32 {
        self.content_loss + self.style_loss
    }
}

/// Mean losses per batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossAverages {
    #[serde(rename = "Total loss")]
    pub total: f32,
    #[serde(rename = "Content loss")]
    pub content: f32,
    #[serde(rename = "Style loss")]
    pub style: f32,
}

/// Running sums over the batches of one epoch.
#[derive(Debug, Clone, Default)]
pub struct LossAggregate {
    content_sum: f64,
    style_sum: f64,
    batches: usize,
    images: usize,
}

impl LossAggregate {
    pub fn push(&mut self, stats: &StepStats) {
        self.content_sum += stats.content_loss as f64;
        self.style_sum += stats.style_loss as f64;
        self.batches += 1;
        self.images += stats.batch_size;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn images(&self) -> usize {
        self.images
    }

    pub fn averages(&self) -> LossAverages {
        let n = self.batches.max(1) as f64;
        let content = self.content_sum / n;
        let style = self.style_sum / n;
        LossAverages {
            total: (content + style) as f32,
            content: content as f32,
            style: style as f32,
        }
    }
}

/// Outcome of a whole training run, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub status: String,
    pub training: Vec<LossAverages>,
}

impl TrainReport {
    pub fn ok(final_losses: LossAverages) -> Self {
        Self {
            status: "ok".to_owned(),
            training: vec![final_losses],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn averages_are_per_batch() {
        let mut agg = LossAggregate::default();
        agg.push(&StepStats {
            content_loss: 2.0,
            style_loss: 10.0,
            batch_size: 4,
        });
        agg.push(&StepStats {
            content_loss: 4.0,
            style_loss: 20.0,
            batch_size: 1,
        });
        let avg = agg.averages();
        assert_eq!(agg.batches(), 2);
        assert_eq!(agg.images(), 5);
        assert_approx_eq!(avg.content, 3.0);
        assert_approx_eq!(avg.style, 15.0);
        assert_approx_eq!(avg.total, 18.0);
    }

    #[test]
    fn empty_aggregate_is_zero() {
        let avg = LossAggregate::default().averages();
        assert_eq!(avg.total, 0.0);
    }

    #[test]
    fn report_uses_display_names() {
        let report = TrainReport::ok(LossAverages {
            total: 3.0,
            content: 1.0,
            style: 2.0,
        });
        let json = serde_json::to_value(&report).expect("Serializable");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["training"][0]["Total loss"], 3.0);
        assert_eq!(json["training"][0]["Content loss"], 1.0);
        assert_eq!(json["training"][0]["Style loss"], 2.0);
    }
}
