use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 模型描述
///
/// 来自模型信息服务，项目名和模型名可能缺失，派发前需要检查。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub tag_list: Vec<String>,
    #[serde(default)]
    pub target_tag_list: Option<Vec<String>>,
}

impl ModelDescriptor {
    pub fn new<P: Into<String>, M: Into<String>>(project_name: P, model_name: M) -> Self {
        Self {
            project_name: Some(project_name.into()),
            model_name: Some(model_name.into()),
            ..Default::default()
        }
    }

    /// 返回 (项目名, 模型名)，任一缺失或为空白时返回 None
    pub fn identity(&self) -> Option<(&str, &str)> {
        let project = self
            .project_name
            .as_deref()
            .filter(|p| !p.trim().is_empty())?;
        let model = self
            .model_name
            .as_deref()
            .filter(|m| !m.trim().is_empty())?;
        Some((project, model))
    }
}

/// 模型规格：输入标签及可选的目标标签
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelSpec {
    pub tag_list: Vec<String>,
    #[serde(default)]
    pub target_tag_list: Option<Vec<String>>,
}

/// 模型训练数据的时间范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTrainingPeriod {
    pub train_start_date: DateTime<Utc>,
    pub train_end_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_both_names() {
        assert_eq!(
            ModelDescriptor::new("p1", "m1").identity(),
            Some(("p1", "m1"))
        );

        let missing_model = ModelDescriptor {
            project_name: Some("p1".into()),
            ..Default::default()
        };
        assert_eq!(missing_model.identity(), None);

        let blank_project = ModelDescriptor::new("  ", "m1");
        assert_eq!(blank_project.identity(), None);
    }

    #[test]
    fn test_descriptor_tolerates_missing_fields() {
        let descriptor: ModelDescriptor =
            serde_json::from_str(r#"{"model_name": "m1", "tag_list": ["t1"]}"#).unwrap();
        assert_eq!(descriptor.project_name, None);
        assert_eq!(descriptor.tag_list, vec!["t1"]);
    }
}
