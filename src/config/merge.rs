use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, project: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = project {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var("ASTERSTUDY_ASTER_VERSION") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.study.aster_version = trimmed.to_string();
        }
    }

    if let Some(raw) = var("ASTERSTUDY_UNDO_LIMIT") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<usize>() {
                Ok(value) => {
                    config.history.undo_limit = value;
                }
                Err(err) => {
                    tracing::warn!("invalid ASTERSTUDY_UNDO_LIMIT, ignoring: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn merge_layers_respects_precedence() {
        let mut user = ConfigLayer::default();
        user.study.aster_version = Some("15.8".to_string());
        user.history.undo_limit = Some(5);

        let mut project = ConfigLayer::default();
        project.study.aster_version = Some("16.4".to_string());

        let config = merge_layers(Some(user), Some(project));
        assert_eq!(config.study.aster_version, "16.4");
        assert_eq!(config.history.undo_limit, 5);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("ASTERSTUDY_ASTER_VERSION", "17.0"),
                ("ASTERSTUDY_UNDO_LIMIT", "12"),
            ]),
        );
        assert_eq!(config.study.aster_version, "17.0");
        assert_eq!(config.history.undo_limit, 12);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, env(&[("ASTERSTUDY_UNDO_LIMIT", "many")]));
        assert_eq!(config.history.undo_limit, 50);
    }
}
