//! Binding footprints
//!
//! Everything a binding leaves on a workload is keyed by its UID. The pod
//! annotations written by each projection are the record of which bindings
//! are present and which secret each one uses, so ownership of env vars,
//! mounts and volumes is always decided from those annotations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use servicebinding_common::{PROJECTOR_ANNOTATION_PREFIX, VOLUME_PREFIX};

const MAPPING_KEY: &str = "mapping-";
const SECRET_KEY: &str = "secret-";
const TYPE_KEY: &str = "type-";
const PROVIDER_KEY: &str = "provider-";

// =============================================================================
// Naming
// =============================================================================

/// Workload annotation holding the mapping template used for `uid`
pub fn mapping_annotation(uid: &str) -> String {
    format!("{}{}{}", PROJECTOR_ANNOTATION_PREFIX, MAPPING_KEY, uid)
}

/// Pod annotation holding the secret bound by `uid`
pub fn secret_annotation(uid: &str) -> String {
    format!("{}{}{}", PROJECTOR_ANNOTATION_PREFIX, SECRET_KEY, uid)
}

/// Pod annotation holding the type of `uid`
pub fn type_annotation(uid: &str) -> String {
    format!("{}{}{}", PROJECTOR_ANNOTATION_PREFIX, TYPE_KEY, uid)
}

/// Pod annotation holding the provider of `uid`
pub fn provider_annotation(uid: &str) -> String {
    format!("{}{}{}", PROJECTOR_ANNOTATION_PREFIX, PROVIDER_KEY, uid)
}

/// Name of the projected volume (and its mounts) for `uid`
pub fn volume_name(uid: &str) -> String {
    format!("{}{}", VOLUME_PREFIX, uid)
}

/// Downward API field path that reads one pod annotation
pub fn annotation_field_path(annotation: &str) -> String {
    format!("metadata.annotations['{}']", annotation)
}

// =============================================================================
// Registry
// =============================================================================

/// What one binding recorded in the pod annotations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footprint {
    /// Bound secret name
    pub secret: Option<String>,
    /// Binding type
    pub type_: Option<String>,
    /// Binding provider
    pub provider: Option<String>,
}

impl Footprint {
    /// Whether `env` was contributed by binding `uid` with this footprint
    ///
    /// Secret-sourced variables are matched by secret name, so two bindings
    /// sharing one secret cannot be told apart.
    pub fn owns_env(&self, uid: &str, env: &EnvVar) -> bool {
        let Some(source) = env.value_from.as_ref() else {
            return false;
        };

        if let (Some(secret), Some(selector)) = (&self.secret, &source.secret_key_ref) {
            if selector.name == *secret {
                return true;
            }
        }

        source.field_ref.as_ref().is_some_and(|field| {
            field.field_path == annotation_field_path(&type_annotation(uid))
                || field.field_path == annotation_field_path(&provider_annotation(uid))
        })
    }
}

/// Footprints of every binding present on a pod template, keyed by UID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FootprintRegistry {
    footprints: BTreeMap<String, Footprint>,
}

impl FootprintRegistry {
    /// Decode the footprints recorded in pod-template annotations
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let mut footprints: BTreeMap<String, Footprint> = BTreeMap::new();

        for (key, value) in annotations {
            let Some(rest) = key.strip_prefix(PROJECTOR_ANNOTATION_PREFIX) else {
                continue;
            };
            if let Some(uid) = rest.strip_prefix(SECRET_KEY) {
                footprints.entry(uid.to_string()).or_default().secret = Some(value.clone());
            } else if let Some(uid) = rest.strip_prefix(TYPE_KEY) {
                footprints.entry(uid.to_string()).or_default().type_ = Some(value.clone());
            } else if let Some(uid) = rest.strip_prefix(PROVIDER_KEY) {
                footprints.entry(uid.to_string()).or_default().provider = Some(value.clone());
            }
        }

        Self { footprints }
    }

    /// Footprint recorded for `uid`
    pub fn get(&self, uid: &str) -> Option<&Footprint> {
        self.footprints.get(uid)
    }

    /// UIDs of every recorded binding, in lexical order
    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.footprints.keys().map(String::as_str)
    }

    /// Number of recorded bindings
    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    /// Whether no binding is recorded
    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// UID of the binding that contributed `env`, if any
    pub fn owner_of_env(&self, env: &EnvVar) -> Option<&str> {
        self.footprints
            .iter()
            .find(|(uid, footprint)| footprint.owns_env(uid, env))
            .map(|(uid, _)| uid.as_str())
    }

    /// Whether any recorded binding contributed `env`
    pub fn owns_env(&self, env: &EnvVar) -> bool {
        self.owner_of_env(env).is_some()
    }

    /// Whether a volume or mount name belongs to a recorded binding
    pub fn owns_volume_name(&self, name: &str) -> bool {
        name.strip_prefix(VOLUME_PREFIX)
            .is_some_and(|uid| self.footprints.contains_key(uid))
    }

    /// Sort binding volumes among the slots they occupy
    pub fn sort_volumes(&self, volumes: &mut [Volume]) {
        sort_owned_in_place(
            volumes,
            |v| self.owns_volume_name(&v.name),
            |a, b| a.name.cmp(&b.name),
        );
    }

    /// Sort binding mounts among the slots they occupy
    pub fn sort_volume_mounts(&self, mounts: &mut [VolumeMount]) {
        sort_owned_in_place(
            mounts,
            |m| self.owns_volume_name(&m.name),
            |a, b| a.name.cmp(&b.name),
        );
    }

    /// Sort binding env vars among the slots they occupy
    ///
    /// Variables are ordered by name; the owning UID breaks ties.
    pub fn sort_env(&self, env: &mut [EnvVar]) {
        sort_owned_in_place(
            env,
            |e| self.owns_env(e),
            |a, b| {
                a.name
                    .cmp(&b.name)
                    .then_with(|| self.owner_of_env(a).cmp(&self.owner_of_env(b)))
            },
        );
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort the owned entries of `items` without moving unowned ones
///
/// Owned entries are collected, sorted with `compare` (stable), and written
/// back into exactly the slots owned entries occupied before.
pub fn sort_owned_in_place<T, O, C>(items: &mut [T], owned: O, compare: C)
where
    T: Clone,
    O: Fn(&T) -> bool,
    C: Fn(&T, &T) -> Ordering,
{
    let slots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| owned(*item))
        .map(|(i, _)| i)
        .collect();

    let mut entries: Vec<T> = slots.iter().map(|&i| items[i].clone()).collect();
    entries.sort_by(|a, b| compare(a, b));

    for (slot, entry) in slots.into_iter().zip(entries) {
        items[slot] = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EnvVarSource, ObjectFieldSelector, SecretKeySelector};

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn secret_env(name: &str, secret: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.to_string(),
                    key: name.to_lowercase(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn field_env(name: &str, annotation: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: annotation_field_path(annotation),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn plain_env(name: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some("x".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn naming_is_uid_scoped() {
        assert_eq!(mapping_annotation("u1"), "projector.servicebinding.io/mapping-u1");
        assert_eq!(secret_annotation("u1"), "projector.servicebinding.io/secret-u1");
        assert_eq!(type_annotation("u1"), "projector.servicebinding.io/type-u1");
        assert_eq!(provider_annotation("u1"), "projector.servicebinding.io/provider-u1");
        assert_eq!(volume_name("u1"), "servicebinding-u1");
        assert_eq!(
            annotation_field_path(&type_annotation("u1")),
            "metadata.annotations['projector.servicebinding.io/type-u1']"
        );
    }

    #[test]
    fn registry_decodes_annotations() {
        let registry = FootprintRegistry::from_annotations(&annotations(&[
            ("projector.servicebinding.io/secret-a", "sa"),
            ("projector.servicebinding.io/type-a", "postgresql"),
            ("projector.servicebinding.io/secret-b", "sb"),
            ("projector.servicebinding.io/provider-b", "bitnami"),
            ("projector.servicebinding.io/mapping-a", "{}"),
            ("unrelated", "value"),
        ]));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.uids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            registry.get("a"),
            Some(&Footprint {
                secret: Some("sa".to_string()),
                type_: Some("postgresql".to_string()),
                provider: None,
            })
        );
        assert_eq!(registry.get("b").unwrap().provider.as_deref(), Some("bitnami"));
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn env_ownership_follows_secret_and_field_refs() {
        let registry = FootprintRegistry::from_annotations(&annotations(&[
            ("projector.servicebinding.io/secret-a", "sa"),
            ("projector.servicebinding.io/secret-b", "sb"),
        ]));

        assert_eq!(registry.owner_of_env(&secret_env("USER", "sa")), Some("a"));
        assert_eq!(registry.owner_of_env(&secret_env("USER", "sb")), Some("b"));
        assert_eq!(
            registry.owner_of_env(&field_env("TYPE", &type_annotation("b"))),
            Some("b")
        );
        assert_eq!(registry.owner_of_env(&secret_env("USER", "other")), None);
        assert_eq!(registry.owner_of_env(&plain_env("PATH")), None);
        assert!(!registry.owns_env(&field_env("NODE", "metadata.name")));
    }

    #[test]
    fn volume_ownership_requires_recorded_uid() {
        let registry = FootprintRegistry::from_annotations(&annotations(&[(
            "projector.servicebinding.io/secret-a",
            "sa",
        )]));
        assert!(registry.owns_volume_name("servicebinding-a"));
        assert!(!registry.owns_volume_name("servicebinding-z"));
        assert!(!registry.owns_volume_name("data"));
    }

    #[test]
    fn sort_owned_in_place_keeps_unowned_slots() {
        let mut items = vec!["x", "c", "y", "a", "b", "z"];
        sort_owned_in_place(&mut items, |s| s.len() == 1 && *s < "d", |a, b| a.cmp(b));
        assert_eq!(items, vec!["x", "a", "y", "b", "c", "z"]);
    }

    #[test]
    fn sort_owned_in_place_is_idempotent() {
        let mut items = vec![5, 1, 4, 2, 3];
        sort_owned_in_place(&mut items, |n| n % 2 == 1, |a, b| a.cmp(b));
        let once = items.clone();
        sort_owned_in_place(&mut items, |n| n % 2 == 1, |a, b| a.cmp(b));
        assert_eq!(items, once);
        assert_eq!(items, vec![1, 3, 4, 2, 5]);
    }

    #[test]
    fn env_sorted_by_name_around_user_entries() {
        let registry = FootprintRegistry::from_annotations(&annotations(&[
            ("projector.servicebinding.io/secret-a", "sa"),
            ("projector.servicebinding.io/secret-b", "sb"),
        ]));
        let mut env = vec![
            plain_env("SERVICE_BINDING_ROOT"),
            secret_env("FOO", "sa"),
            plain_env("USER_VAR"),
            secret_env("BAR", "sb"),
            secret_env("BAR", "sa"),
        ];
        registry.sort_env(&mut env);

        let names: Vec<(&str, Option<&str>)> = env
            .iter()
            .map(|e| (e.name.as_str(), registry.owner_of_env(e)))
            .collect();
        assert_eq!(
            names,
            vec![
                ("SERVICE_BINDING_ROOT", None),
                ("BAR", Some("a")),
                ("USER_VAR", None),
                ("BAR", Some("b")),
                ("FOO", Some("a")),
            ]
        );
    }

    #[test]
    fn volumes_sorted_by_uid() {
        let registry = FootprintRegistry::from_annotations(&annotations(&[
            ("projector.servicebinding.io/secret-a", "sa"),
            ("projector.servicebinding.io/secret-b", "sb"),
        ]));
        let volume = |name: &str| Volume {
            name: name.to_string(),
            ..Default::default()
        };
        let mut volumes = vec![volume("servicebinding-b"), volume("data"), volume("servicebinding-a")];
        registry.sort_volumes(&mut volumes);
        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["servicebinding-a", "data", "servicebinding-b"]);
    }
}
