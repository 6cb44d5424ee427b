//! Local affect analyzer used when no remote affect service is configured.
//!
//! Applies a fixed interpretation guide to the feature bands and returns a
//! one or two sentence observation.

use crate::analysis::affect::{AffectFeatures, AffectInsight};
use crate::ports::FacialAnalysisPort;
use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[derive(Debug, Default, Clone)]
pub struct RuleBasedAffectAnalyzer;

impl RuleBasedAffectAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// First matching rule wins.
    pub fn interpret(&self, f: &AffectFeatures) -> String {
        if f.confidence < 50 {
            return "I couldn't see your expression clearly. Try facing the camera with good lighting so I can give you presence feedback.".to_string();
        }

        if f.tension >= 60 && f.symmetry < 40 {
            "You seem a little tense. Take a slow breath and relax your jaw and shoulders before you continue.".to_string()
        } else if f.smile >= 60 && (40..80).contains(&f.eye_open) {
            "You come across as confident and warm. Keep that relaxed smile, it builds rapport.".to_string()
        } else if f.brow_raise >= 60 && f.eye_open >= 60 {
            "You look alert and surprised at times. Try to keep a calm, steady expression while you think.".to_string()
        } else if f.eye_open >= 60 && f.tension < 40 {
            "You look focused and engaged. Your attention comes through on camera.".to_string()
        } else if f.symmetry >= 60 && f.tension < 60 && f.smile < 60 {
            if f.smile < 40 {
                "You appear composed but a bit serious. An occasional smile will make you more approachable.".to_string()
            } else {
                "You appear composed and professional. Keep that balanced presence.".to_string()
            }
        } else if f.smile < 40 {
            "Your expression reads as neutral and serious. Let a little more warmth show when you talk about your wins.".to_string()
        } else {
            "Your on-camera presence is steady. Keep maintaining eye contact with the camera.".to_string()
        }
    }
}

#[async_trait]
impl FacialAnalysisPort for RuleBasedAffectAnalyzer {
    async fn analyze_affect(&self, features: &AffectFeatures, _trends: Option<&str>) -> Result<AffectInsight> {
        features.validate().map_err(|e| anyhow!(e))?;
        Ok(AffectInsight::new(self.interpret(features)))
    }
}
