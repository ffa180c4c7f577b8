//! The command tree.
//!
//! A [`Namespace`] maps names to lazily built children: nested namespaces,
//! commands, or aliases of a sibling. Each child factory runs at most once;
//! the built node is cached on its entry for the lifetime of the tree, so
//! repeated lookups (help enumerating everything, re-entrant
//! `run_command` calls) share one instance.

use crate::command::Command;
use crate::parser::{check_global_collisions, global_options};
use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// A materialized child of a namespace.
#[derive(Clone)]
pub enum Node {
    Namespace(Arc<Namespace>),
    Command(Arc<dyn Command>),
}

impl Node {
    pub fn as_command(&self) -> Option<&Arc<dyn Command>> {
        match self {
            Node::Command(cmd) => Some(cmd),
            Node::Namespace(_) => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Arc<Namespace>> {
        match self {
            Node::Namespace(ns) => Some(ns),
            Node::Command(_) => None,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            Node::Namespace(ns) => ns.summary(),
            Node::Command(cmd) => &cmd.metadata().summary,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Namespace(ns) => write!(f, "Namespace({})", ns.name()),
            Node::Command(cmd) => write!(f, "Command({})", cmd.metadata().name),
        }
    }
}

type Factory = Box<dyn Fn() -> BoxFuture<'static, Result<Node>> + Send + Sync>;

enum Entry {
    Lazy {
        factory: Factory,
        cell: OnceCell<Node>,
    },
    Alias(String),
}

/// Declaration defects caught when a namespace is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("namespace `{namespace}` declares `{name}` more than once")]
    DuplicateEntry { namespace: String, name: String },
    #[error("alias `{alias}` in namespace `{namespace}` points at unknown entry `{target}`")]
    DanglingAlias {
        namespace: String,
        alias: String,
        target: String,
    },
    #[error("alias `{alias}` in namespace `{namespace}` points at another alias `{target}`")]
    AliasToAlias {
        namespace: String,
        alias: String,
        target: String,
    },
}

/// A routing node of the command tree.
///
/// Built once through [`Namespace::builder`]; afterwards only the per-entry
/// caches change.
pub struct Namespace {
    name: String,
    summary: String,
    parent: OnceLock<Weak<Namespace>>,
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Namespace {
    /// Start declaring a namespace called `name`.
    pub fn builder(name: impl Into<String>) -> NamespaceBuilder {
        NamespaceBuilder {
            name: name.into(),
            summary: String::new(),
            entries: BTreeMap::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// The enclosing namespace, once this one has been reached through it.
    pub fn parent(&self) -> Option<Arc<Namespace>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Names from the root (excluded) down to this namespace.
    pub fn path(&self) -> Vec<String> {
        match self.parent() {
            Some(parent) => {
                let mut path = parent.path();
                path.push(self.name.clone());
                path
            }
            None => Vec::new(),
        }
    }

    /// The canonical name `name` routes to, following one alias hop.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        match self.entries.get(name)? {
            Entry::Lazy { .. } => Some(name),
            Entry::Alias(target) => Some(target),
        }
    }

    /// Aliases declared for the canonical entry `name`.
    pub fn aliases_of(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|(alias, entry)| match entry {
                Entry::Alias(target) if target == name => Some(alias.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Look up and materialize the child routed to by `name`.
    ///
    /// Returns the canonical name with the node, or `None` when nothing is
    /// registered under `name`.
    pub async fn get(self: &Arc<Self>, name: &str) -> Result<Option<(String, Node)>> {
        let Some(canonical) = self.canonical_name(name) else {
            return Ok(None);
        };
        let Some(Entry::Lazy { factory, cell }) = self.entries.get(canonical) else {
            return Ok(None);
        };

        let node = cell
            .get_or_try_init(|| async move {
                debug!(namespace = %self.name, child = canonical, "materializing");
                let node = factory()
                    .await
                    .with_context(|| format!("failed to load `{canonical}`"))?;
                if let Node::Namespace(child) = &node {
                    let _ = child.parent.set(Arc::downgrade(self));
                }
                Ok::<_, anyhow::Error>(node)
            })
            .await?;

        Ok(Some((canonical.to_string(), node.clone())))
    }

    /// Every canonical child, materialized, in name order. Aliases are
    /// skipped.
    pub async fn children(self: &Arc<Self>) -> Result<Vec<(String, Node)>> {
        let mut children = Vec::new();
        for (name, entry) in &self.entries {
            if let Entry::Alias(_) = entry {
                continue;
            }
            if let Some(child) = self.get(name).await? {
                children.push(child);
            }
        }
        Ok(children)
    }

    /// Walk `argv` down the tree as far as it matches.
    ///
    /// Descends through namespaces and stops after the first command; the
    /// first token that matches nothing and everything after it is residual.
    pub async fn locate(self: &Arc<Self>, argv: &[String]) -> Result<ResolvedLocation> {
        let mut path = vec![(self.name.clone(), Node::Namespace(Arc::clone(self)))];
        let mut current = Arc::clone(self);
        let mut consumed = 0;

        for token in argv {
            match current.get(token).await? {
                Some((name, Node::Namespace(ns))) => {
                    path.push((name, Node::Namespace(Arc::clone(&ns))));
                    current = ns;
                    consumed += 1;
                }
                Some((name, node @ Node::Command(_))) => {
                    path.push((name, node));
                    consumed += 1;
                    break;
                }
                None => break,
            }
        }

        let location = ResolvedLocation {
            path,
            residual: argv[consumed..].to_vec(),
        };
        debug!(path = ?location.names(), residual = ?location.residual, "located");
        Ok(location)
    }
}

/// Declares the entries of a [`Namespace`].
///
/// Declaration errors are remembered and reported by
/// [`NamespaceBuilder::build`].
pub struct NamespaceBuilder {
    name: String,
    summary: String,
    entries: BTreeMap<String, Entry>,
    error: Option<NamespaceError>,
}

impl NamespaceBuilder {
    /// One-line description shown in help listings.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Register a command built synchronously on first use.
    pub fn command<F, C>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Command + 'static,
    {
        self.command_async(name, move || {
            let cmd = factory();
            async move { Ok(cmd) }
        })
    }

    /// Register a command whose construction is asynchronous and may fail.
    pub fn command_async<F, Fut, C>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C>> + Send + 'static,
        C: Command + 'static,
    {
        let factory: Factory = Box::new(move || {
            let fut = factory();
            async move {
                let cmd = fut.await?;
                cmd.metadata().validate()?;
                check_global_collisions(cmd.metadata(), &global_options(true))?;
                Ok::<_, anyhow::Error>(Node::Command(Arc::new(cmd) as Arc<dyn Command>))
            }
            .boxed()
        });
        self.insert(name.into(), factory)
    }

    /// Register a nested namespace built synchronously on first use.
    pub fn namespace<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Namespace> + Send + Sync + 'static,
    {
        self.namespace_async(name, move || {
            let namespace = factory();
            async move { namespace }
        })
    }

    /// Register a nested namespace whose construction is asynchronous and
    /// may fail.
    pub fn namespace_async<F, Fut>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Namespace>> + Send + 'static,
    {
        let factory: Factory = Box::new(move || {
            let fut = factory();
            async move { Ok::<_, anyhow::Error>(Node::Namespace(Arc::new(fut.await?))) }.boxed()
        });
        self.insert(name.into(), factory)
    }

    /// Route `alias` to the sibling entry `target`.
    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        let alias = alias.into();
        if self.entries.contains_key(&alias) {
            self.record(NamespaceError::DuplicateEntry {
                namespace: self.name.clone(),
                name: alias,
            });
            return self;
        }
        self.entries.insert(alias, Entry::Alias(target.into()));
        self
    }

    /// Finish the declaration, rejecting duplicate names and aliases that
    /// point nowhere or at another alias.
    pub fn build(self) -> Result<Namespace, NamespaceError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        for (alias, entry) in &self.entries {
            let Entry::Alias(target) = entry else {
                continue;
            };
            match self.entries.get(target) {
                None => {
                    return Err(NamespaceError::DanglingAlias {
                        namespace: self.name.clone(),
                        alias: alias.clone(),
                        target: target.clone(),
                    });
                }
                Some(Entry::Alias(_)) => {
                    return Err(NamespaceError::AliasToAlias {
                        namespace: self.name.clone(),
                        alias: alias.clone(),
                        target: target.clone(),
                    });
                }
                Some(Entry::Lazy { .. }) => {}
            }
        }
        Ok(Namespace {
            name: self.name,
            summary: self.summary,
            parent: OnceLock::new(),
            entries: self.entries,
        })
    }

    fn insert(mut self, name: String, factory: Factory) -> Self {
        if self.entries.contains_key(&name) {
            self.record(NamespaceError::DuplicateEntry {
                namespace: self.name.clone(),
                name,
            });
            return self;
        }
        self.entries.insert(
            name,
            Entry::Lazy {
                factory,
                cell: OnceCell::new(),
            },
        );
        self
    }

    fn record(&mut self, err: NamespaceError) {
        self.error.get_or_insert(err);
    }
}

/// Result of walking argv down the tree.
#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    /// `(canonical name, node)` from the root to the deepest match.
    pub path: Vec<(String, Node)>,
    /// Tokens not consumed by the walk.
    pub residual: Vec<String>,
}

impl ResolvedLocation {
    /// The deepest node reached.
    pub fn leaf(&self) -> &Node {
        // the root is always present
        &self.path[self.path.len() - 1].1
    }

    /// The matched command, when the walk ended on one.
    pub fn command(&self) -> Option<&Arc<dyn Command>> {
        self.leaf().as_command()
    }

    /// Canonical names below the root.
    pub fn names(&self) -> Vec<String> {
        self.path.iter().skip(1).map(|(name, _)| name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Outcome;
    use crate::command::{Command, Invocation};
    use crate::executor::CommandContext;
    use crate::metadata::CommandMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop {
        metadata: CommandMetadata,
    }

    impl Noop {
        fn new(name: &str) -> Self {
            Self {
                metadata: CommandMetadata::new(name, format!("{name} summary")),
            }
        }
    }

    #[async_trait]
    impl Command for Noop {
        fn metadata(&self) -> &CommandMetadata {
            &self.metadata
        }

        async fn run(&self, _ctx: &CommandContext<'_>, _inv: &Invocation) -> Result<Outcome> {
            Ok(Outcome::Continue)
        }
    }

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> Arc<Namespace> {
        let root = Namespace::builder("stratus")
            .namespace("a", || {
                Ok(Namespace::builder("a")
                    .summary("group a")
                    .command("b", || Noop::new("b"))
                    .alias("bee", "b")
                    .build()?)
            })
            .command("build", || Noop::new("build"))
            .alias("bld", "build")
            .build()
            .unwrap();
        Arc::new(root)
    }

    #[tokio::test]
    async fn test_locate_nested_command_with_residual() {
        let root = tree();
        let loc = root.locate(&argv(&["a", "b", "x"])).await.unwrap();

        let names: Vec<&str> = loc.path.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["stratus", "a", "b"]);
        assert_eq!(loc.residual, argv(&["x"]));
        assert_eq!(loc.command().unwrap().metadata().name, "b");
    }

    #[tokio::test]
    async fn test_alias_reports_canonical_name() {
        let root = tree();
        let loc = root.locate(&argv(&["a", "bee"])).await.unwrap();
        assert_eq!(loc.names(), argv(&["a", "b"]));

        let loc = root.locate(&argv(&["bld", "--prod"])).await.unwrap();
        assert_eq!(loc.names(), argv(&["build"]));
        assert_eq!(loc.residual, argv(&["--prod"]));
    }

    #[tokio::test]
    async fn test_alias_and_target_share_one_instance() {
        let root = tree();
        let via_name = root.locate(&argv(&["build"])).await.unwrap();
        let via_alias = root.locate(&argv(&["bld"])).await.unwrap();
        assert!(Arc::ptr_eq(
            via_name.command().unwrap(),
            via_alias.command().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_unmatched_first_token_stays_at_root() {
        let root = tree();
        let loc = root.locate(&argv(&["nope", "b"])).await.unwrap();
        assert_eq!(loc.path.len(), 1);
        assert_eq!(loc.residual, argv(&["nope", "b"]));
        assert!(loc.command().is_none());
    }

    #[tokio::test]
    async fn test_empty_argv_is_root_only() {
        let root = tree();
        let loc = root.locate(&[]).await.unwrap();
        assert_eq!(loc.path.len(), 1);
        assert!(loc.residual.is_empty());
    }

    #[tokio::test]
    async fn test_trailing_namespace_is_not_a_command() {
        let root = tree();
        let loc = root.locate(&argv(&["a"])).await.unwrap();
        assert_eq!(loc.names(), argv(&["a"]));
        assert!(loc.command().is_none());
        assert_eq!(loc.leaf().as_namespace().unwrap().summary(), "group a");
    }

    #[tokio::test]
    async fn test_factories_run_at_most_once() {
        let ns_calls = Arc::new(AtomicUsize::new(0));
        let cmd_calls = Arc::new(AtomicUsize::new(0));

        let root = {
            let ns_calls = Arc::clone(&ns_calls);
            let cmd_calls = Arc::clone(&cmd_calls);
            Namespace::builder("stratus")
                .namespace("a", move || {
                    ns_calls.fetch_add(1, Ordering::SeqCst);
                    let cmd_calls = Arc::clone(&cmd_calls);
                    Ok(Namespace::builder("a")
                        .command("b", move || {
                            cmd_calls.fetch_add(1, Ordering::SeqCst);
                            Noop::new("b")
                        })
                        .build()?)
                })
                .build()
                .unwrap()
        };
        let root = Arc::new(root);

        for _ in 0..5 {
            root.locate(&argv(&["a", "b"])).await.unwrap();
        }
        root.children().await.unwrap();

        assert_eq!(ns_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cmd_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unwalked_branches_are_never_built() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let root = Namespace::builder("stratus")
            .command("cheap", || Noop::new("cheap"))
            .command("expensive", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Noop::new("expensive")
            })
            .build()
            .unwrap();
        let root = Arc::new(root);

        root.locate(&argv(&["cheap"])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_factory_and_parent_links() {
        let root = Namespace::builder("stratus")
            .namespace_async("cloud", || async {
                Ok(Namespace::builder("cloud")
                    .namespace("deploy", || {
                        Ok(Namespace::builder("deploy")
                            .command_async("web", || async { Ok(Noop::new("web")) })
                            .build()?)
                    })
                    .build()?)
            })
            .build()
            .unwrap();
        let root = Arc::new(root);

        let loc = root.locate(&argv(&["cloud", "deploy", "web"])).await.unwrap();
        assert_eq!(loc.names(), argv(&["cloud", "deploy", "web"]));

        let deploy = loc.path[2].1.as_namespace().unwrap();
        assert_eq!(deploy.path(), argv(&["cloud", "deploy"]));
        assert_eq!(deploy.parent().unwrap().name(), "cloud");
    }

    #[tokio::test]
    async fn test_factory_failure_propagates() {
        let root = Namespace::builder("stratus")
            .command_async("broken", || async {
                Err::<Noop, _>(anyhow::anyhow!("module missing"))
            })
            .build()
            .unwrap();
        let root = Arc::new(root);

        let err = root.locate(&argv(&["broken"])).await.unwrap_err();
        assert!(format!("{err:#}").contains("module missing"));
    }

    #[tokio::test]
    async fn test_invalid_metadata_fails_materialization() {
        let root = Namespace::builder("stratus")
            .command("spaced", || Noop::new("has space"))
            .build()
            .unwrap();
        let root = Arc::new(root);
        assert!(root.locate(&argv(&["spaced"])).await.is_err());
    }

    #[tokio::test]
    async fn test_global_option_collision_fails_materialization() {
        let root = Namespace::builder("stratus")
            .command("clash", || Noop {
                metadata: CommandMetadata::new("clash", "")
                    .option(crate::metadata::OptionSpec::boolean("json", "")),
            })
            .build()
            .unwrap();
        let root = Arc::new(root);

        let err = root.locate(&argv(&["clash"])).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::metadata::MetadataError>(),
            Some(crate::metadata::MetadataError::GlobalOptionCollision { option, .. }) if option == "json"
        ));
        // the defect also blocks listing the namespace
        assert!(root.children().await.is_err());
    }

    #[test]
    fn test_builder_rejects_bad_aliases() {
        let err = Namespace::builder("stratus")
            .alias("x", "missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, NamespaceError::DanglingAlias { .. }));

        let err = Namespace::builder("stratus")
            .command("build", || Noop::new("build"))
            .alias("b", "build")
            .alias("bb", "b")
            .build()
            .unwrap_err();
        assert!(matches!(err, NamespaceError::AliasToAlias { .. }));

        let err = Namespace::builder("stratus")
            .command("build", || Noop::new("build"))
            .command("build", || Noop::new("build"))
            .build()
            .unwrap_err();
        assert!(matches!(err, NamespaceError::DuplicateEntry { .. }));
    }

    #[test]
    fn test_aliases_of_lists_routing_names() {
        let root = tree();
        assert_eq!(root.aliases_of("build"), vec!["bld"]);
        assert!(root.aliases_of("a").is_empty());
    }
}
