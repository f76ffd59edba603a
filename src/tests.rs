#[cfg(test)]
mod tests {
    use crate::cli::Cli;
    use crate::hooks::ContainerFilter;
    use crate::selector;
    use crate::tailer::split_timestamp;
    use crate::types::{ContainerSpec, LogMessage, PodSnapshot, WatchEvent};
    use crate::utils::{self, OutputOptions};
    use crate::watch::PodTracker;
    use clap::Parser;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::watcher::Event;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn k8s_pod(name: &str, containers: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(labels(&[("app", "web")])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|c| Container {
                        name: c.to_string(),
                        image: Some("nginx:1.27".to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn snapshot(name: &str, containers: &[&str]) -> PodSnapshot {
        PodSnapshot::from_pod(&k8s_pod(name, containers)).unwrap()
    }

    fn names(events: &[WatchEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                WatchEvent::Added(p) => format!("added:{}", p.name),
                WatchEvent::Updated(p) => format!("updated:{}", p.name),
                WatchEvent::Deleted(p) => format!("deleted:{}", p.name),
            })
            .collect()
    }

    #[test]
    fn test_cli_parsing_patterns_and_excludes() {
        let cli = Cli::try_parse_from(["ktail", "web", "api-.*", "-x", "istio-proxy"]).unwrap();
        assert_eq!(cli.patterns, vec!["web".to_string(), "api-.*".to_string()]);
        assert_eq!(cli.exclude, vec!["istio-proxy".to_string()]);
        assert!(cli.selector.is_none());
    }

    #[test]
    fn test_cli_parsing_scope() {
        let cli = Cli::try_parse_from(["ktail", "-n", "prod", "-l", "app=nginx"]).unwrap();
        assert_eq!(cli.namespace, Some("prod".to_string()));
        assert_eq!(cli.selector, Some("app=nginx".to_string()));
        assert!(!cli.all_namespaces);
    }

    #[test]
    fn test_cli_all_namespaces_conflicts_with_namespace() {
        assert!(Cli::try_parse_from(["ktail", "-A", "-n", "prod"]).is_err());
    }

    #[test]
    fn test_cli_parsing_tail_and_flags() {
        let cli = Cli::try_parse_from(["ktail", "--tail", "10", "-v", "-q", "--raw"]).unwrap();
        assert_eq!(cli.tail, Some(10));
        assert!(cli.verbose);
        assert!(cli.quiet);
        assert!(cli.raw);
        assert_eq!(cli.buffer_size, 1000);
    }

    #[test]
    fn test_parse_selector_equality() {
        let sel = selector::parse_selector("app=nginx,version==v1").unwrap();
        assert_eq!(sel.match_labels, Some(labels(&[("app", "nginx"), ("version", "v1")])));
        assert!(sel.match_expressions.is_none());
    }

    #[test]
    fn test_parse_selector_set_based() {
        let sel =
            selector::parse_selector("env in (prod, stage),tier notin (db),!legacy,team").unwrap();
        let exprs = sel.match_expressions.unwrap();
        let ops: Vec<(&str, &str)> = exprs
            .iter()
            .map(|e| (e.key.as_str(), e.operator.as_str()))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("env", "In"),
                ("tier", "NotIn"),
                ("legacy", "DoesNotExist"),
                ("team", "Exists")
            ]
        );
        assert_eq!(exprs[0].values, Some(vec!["prod".to_string(), "stage".to_string()]));
    }

    #[test]
    fn test_parse_selector_rejects_garbage() {
        assert!(selector::parse_selector("env in (prod").is_err());
        assert!(selector::parse_selector("a b").is_err());
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let sel = selector::parse_selector("").unwrap();
        assert!(selector::matches_selector(&BTreeMap::new(), &sel));
        assert!(selector::selector_to_string(&sel).is_none());
    }

    #[test]
    fn test_matches_selector() {
        let pod_labels = labels(&[("app", "nginx"), ("env", "prod")]);
        let matches = |s: &str| {
            selector::matches_selector(&pod_labels, &selector::parse_selector(s).unwrap())
        };

        assert!(matches("app=nginx"));
        assert!(!matches("app=redis"));
        assert!(matches("env in (prod,dev)"));
        assert!(!matches("env notin (prod)"));
        assert!(matches("tier!=db"));
        assert!(matches("app,!legacy"));
        assert!(!matches("legacy"));
    }

    #[test]
    fn test_selector_to_string() {
        let sel = selector::parse_selector("app=nginx,env in (prod,dev),!legacy").unwrap();
        assert_eq!(
            selector::selector_to_string(&sel),
            Some("app=nginx,env in (prod,dev),!legacy".to_string())
        );
    }

    #[test]
    fn test_pod_snapshot_requires_spec() {
        let mut pod = k8s_pod("web-1", &["nginx"]);
        let snap = PodSnapshot::from_pod(&pod).unwrap();
        assert_eq!(
            snap.containers,
            vec![ContainerSpec {
                name: "nginx".to_string(),
                image: Some("nginx:1.27".to_string())
            }]
        );
        assert_eq!(snap.key_for(&snap.containers[0]).to_string(), "default/web-1/nginx");

        pod.spec = None;
        assert!(PodSnapshot::from_pod(&pod).is_none());
    }

    #[test]
    fn test_tracker_add_update_delete() {
        let mut tracker = PodTracker::default();
        let mut events = tracker.apply(Event::Apply(k8s_pod("web-1", &["nginx"])));
        events.extend(tracker.apply(Event::Apply(k8s_pod("web-1", &["nginx"]))));
        events.extend(tracker.apply(Event::Delete(k8s_pod("web-1", &["nginx"]))));
        assert_eq!(names(&events), vec!["added:web-1", "updated:web-1", "deleted:web-1"]);
    }

    #[test]
    fn test_tracker_relist_deletes_vanished_pods() {
        let mut tracker = PodTracker::default();
        tracker.apply(Event::Apply(k8s_pod("web-1", &["nginx"])));
        tracker.apply(Event::Apply(k8s_pod("web-2", &["nginx"])));

        // Watch reconnects; web-2 disappeared meanwhile and web-3 appeared.
        let mut events = tracker.apply(Event::Init);
        events.extend(tracker.apply(Event::InitApply(k8s_pod("web-1", &["nginx"]))));
        events.extend(tracker.apply(Event::InitApply(k8s_pod("web-3", &["nginx"]))));
        events.extend(tracker.apply(Event::InitDone));

        assert_eq!(names(&events), vec!["updated:web-1", "added:web-3", "deleted:web-2"]);
    }

    #[test]
    fn test_tracker_drops_malformed_pods() {
        let mut tracker = PodTracker::default();
        let mut pod = k8s_pod("web-1", &["nginx"]);
        pod.metadata.namespace = None;
        assert!(tracker.apply(Event::Apply(pod.clone())).is_empty());
        assert!(tracker.apply(Event::Delete(pod)).is_empty());
    }

    #[test]
    fn test_container_filter() {
        let pod = snapshot("api-7d9f", &["app", "istio-proxy"]);
        let app = &pod.containers[0];
        let proxy = &pod.containers[1];

        let everything = ContainerFilter::default();
        assert!(everything.matches(&pod, app));

        let by_pod = ContainerFilter::new(&["^api-".to_string()], &[]).unwrap();
        assert!(by_pod.matches(&pod, proxy));

        let excluding = ContainerFilter::new(&[], &["istio".to_string()]).unwrap();
        assert!(excluding.matches(&pod, app));
        assert!(!excluding.matches(&pod, proxy));

        assert!(ContainerFilter::new(&["(".to_string()], &[]).is_err());
    }

    #[test]
    fn test_split_timestamp() {
        let (ts, text) = split_timestamp("2025-03-01T10:00:00.123456789Z GET /healthz 200");
        assert_eq!(text, "GET /healthz 200");
        assert_eq!(
            ts.unwrap().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2025-03-01T10:00:00.123Z"
        );

        let (ts, text) = split_timestamp("no timestamp here");
        assert!(ts.is_none());
        assert_eq!(text, "no timestamp here");
    }

    #[test]
    fn test_format_line() {
        let msg = LogMessage {
            namespace: "default".to_string(),
            pod_name: "web-1".to_string(),
            container_name: "nginx".to_string(),
            line: "hello".to_string(),
            timestamp: split_timestamp("2025-03-01T10:00:00Z x").0,
        };

        let plain = OutputOptions::default();
        assert_eq!(utils::format_line(&msg, plain), "[default/web-1/nginx] hello");

        let raw = OutputOptions {
            raw: true,
            ..plain
        };
        assert_eq!(utils::format_line(&msg, raw), "hello");

        let stamped = OutputOptions {
            timestamps: true,
            ..plain
        };
        assert_eq!(
            utils::format_line(&msg, stamped),
            "[default/web-1/nginx] 2025-03-01T10:00:00.000Z hello"
        );
    }

    #[test]
    fn test_color_is_stable_per_pod() {
        assert_eq!(utils::get_color("default/web-1"), utils::get_color("default/web-1"));
    }
}
