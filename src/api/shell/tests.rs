use super::inject_kubectl_context;

#[test]
fn inject_context_corpus() {
    let cases: &[(&str, &str, &str, &str)] = &[
        (
            "simple kubectl command",
            "kubectl get pods",
            "minikube",
            "kubectl --context=minikube get pods",
        ),
        (
            "kubectl with namespace",
            "kubectl get pods -n default",
            "prod",
            "kubectl --context=prod get pods -n default",
        ),
        (
            "chained kubectl commands with &&",
            "kubectl get pods && kubectl get svc",
            "minikube",
            "kubectl --context=minikube get pods && kubectl --context=minikube get svc",
        ),
        (
            "mixed commands",
            "echo hello && kubectl get pods && ls -la",
            "minikube",
            "echo hello && kubectl --context=minikube get pods && ls -la",
        ),
        (
            "kubectl with pipe",
            "kubectl get pods | grep nginx",
            "minikube",
            "kubectl --context=minikube get pods | grep nginx",
        ),
        (
            "multiple pipes",
            "kubectl get pods | grep nginx | wc -l",
            "minikube",
            "kubectl --context=minikube get pods | grep nginx | wc -l",
        ),
        (
            "kubectl with semicolon",
            "kubectl get pods; kubectl get svc",
            "minikube",
            "kubectl --context=minikube get pods; kubectl --context=minikube get svc",
        ),
        (
            "kubectl with OR operator",
            "kubectl get pods || echo failed",
            "minikube",
            "kubectl --context=minikube get pods || echo failed",
        ),
        (
            "already has context flag",
            "kubectl --context=existing get pods",
            "minikube",
            "kubectl --context=existing get pods",
        ),
        (
            // Skips injection entirely if --context appears anywhere.
            "one command has context, one does not",
            "kubectl --context=foo get pods && kubectl get svc",
            "minikube",
            "kubectl --context=foo get pods && kubectl get svc",
        ),
        (
            "no kubectl command",
            "echo hello && ls -la",
            "minikube",
            "echo hello && ls -la",
        ),
        (
            // Accepted limitation of the coarse rewrite: quoted strings are
            // rewritten too.
            "kubectl inside a quoted string",
            "echo 'kubectl is great' && ls",
            "minikube",
            "echo 'kubectl --context=minikube is great' && ls",
        ),
        ("empty context", "kubectl get pods", "", "kubectl get pods"),
        (
            "kubectl config current-context",
            "kubectl config current-context",
            "minikube",
            "kubectl --context=minikube config current-context",
        ),
        (
            "complex real-world example",
            "kubectl config current-context && kubectl get pods --all-namespaces --no-headers | wc -l",
            "minikube",
            "kubectl --context=minikube config current-context && kubectl --context=minikube get pods --all-namespaces --no-headers | wc -l",
        ),
        (
            "kubectl with tabs",
            "kubectl\tget\tpods",
            "minikube",
            "kubectl --context=minikube\tget\tpods",
        ),
        (
            "kubectl with multiple spaces",
            "kubectl  get  pods",
            "minikube",
            "kubectl --context=minikube  get  pods",
        ),
        (
            "kubectl with trailing space",
            "kubectl get po ",
            "minikube",
            "kubectl --context=minikube get po ",
        ),
        (
            "kubectl with only trailing space",
            "kubectl ",
            "minikube",
            "kubectl --context=minikube ",
        ),
    ];

    for (name, command, context, expected) in cases {
        let result = inject_kubectl_context(command, context);
        assert_eq!(&result, expected, "case {name:?} failed for {command:?}");
    }
}

#[test]
fn inject_context_does_not_match_similar_words() {
    assert_eq!(
        inject_kubectl_context("mykubectl get pods", "minikube"),
        "mykubectl get pods"
    );
}

// The contract for property-style callers: unchanged iff the command
// already mentions --context or the context is empty.
#[test]
fn inject_context_identity_conditions() {
    let commands = [
        "kubectl get pods",
        "kubectl get pods && ls",
        "echo done",
        "kubectl --context=a get pods",
    ];
    for command in commands {
        assert_eq!(inject_kubectl_context(command, ""), command);
        let injected = inject_kubectl_context(command, "ctx");
        if command.contains("--context") || !command.contains("kubectl") {
            assert_eq!(injected, command);
        } else {
            assert_ne!(injected, command);
            assert!(injected.contains("--context=ctx"));
        }
    }
}
