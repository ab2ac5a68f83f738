//! The in-memory, TTL-cached `DependencyResolver`. Algorithmically grounded
//! on the orphaned `services::dependency_resolver` module's Kahn's-algorithm
//! topological sort and DFS cycle detection with path extraction, rebuilt
//! against the current `Store`/`Task` shape and the caching policy
//! `spec.md` §4.2 describes ("full rebuild on expiry, no incremental
//! patching", default TTL 60s).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::ports::{Clock, DependencyResolver, Store};

/// Default cache lifetime; `spec.md` §4.2 "Cache invalidation".
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Graph {
    /// `dependent -> {prerequisite}`. Walking this forward from a node
    /// answers "what does it depend on".
    prereqs: HashMap<Uuid, HashSet<Uuid>>,
    /// `prerequisite -> {dependent}`, the reverse index.
    dependents: HashMap<Uuid, HashSet<Uuid>>,
}

struct CacheState {
    graph: Graph,
    depth_memo: HashMap<Uuid, u32>,
    built_at: Option<DateTime<Utc>>,
}

impl Default for CacheState {
    fn default() -> Self {
        Self {
            graph: Graph::default(),
            depth_memo: HashMap::new(),
            built_at: None,
        }
    }
}

/// Caches the full dependency DAG in memory, rebuilt wholesale from
/// `Store::list_all_dependency_edges` whenever the cache is empty, stale,
/// or explicitly invalidated. There is no incremental patching: a single
/// new edge invalidates and rebuilds the whole graph, trading a little
/// extra work for an implementation simple enough to trust.
pub struct InMemoryDependencyResolver<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
    ttl: Duration,
    cache: RwLock<CacheState>,
}

impl<S, C> InMemoryDependencyResolver<S, C>
where
    S: Store,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self::with_ttl(store, clock, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<S>, clock: Arc<C>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            cache: RwLock::new(CacheState::default()),
        }
    }

    async fn ensure_fresh(&self) -> QueueResult<()> {
        let stale = {
            let cache = self.cache.read().await;
            match cache.built_at {
                None => true,
                Some(built_at) => {
                    let age = self.clock.now().signed_duration_since(built_at);
                    age.num_seconds() < 0 || age.num_seconds() as u64 >= self.ttl.as_secs()
                }
            }
        };
        if !stale {
            return Ok(());
        }

        let edges = self.store.list_all_dependency_edges().await?;
        let mut graph = Graph::default();
        for edge in &edges {
            graph
                .prereqs
                .entry(edge.dependent_task_id)
                .or_default()
                .insert(edge.prerequisite_task_id);
            graph
                .dependents
                .entry(edge.prerequisite_task_id)
                .or_default()
                .insert(edge.dependent_task_id);
        }

        let mut cache = self.cache.write().await;
        cache.graph = graph;
        cache.depth_memo.clear();
        cache.built_at = Some(self.clock.now());
        Ok(())
    }

    /// DFS search for a path `from -> ... -> to` following `prereqs` edges
    /// (i.e. "does `from` transitively depend on `to`").
    fn find_path(graph: &Graph, from: Uuid, to: Uuid) -> Option<Vec<Uuid>> {
        let mut stack = vec![(from, vec![from])];
        let mut visited = HashSet::new();
        while let Some((node, path)) = stack.pop() {
            if node == to {
                return Some(path);
            }
            if !visited.insert(node) {
                continue;
            }
            if let Some(next) = graph.prereqs.get(&node) {
                for &neighbor in next {
                    if !visited.contains(&neighbor) {
                        let mut extended = path.clone();
                        extended.push(neighbor);
                        stack.push((neighbor, extended));
                    }
                }
            }
        }
        None
    }

    fn depth_of(graph: &Graph, memo: &mut HashMap<Uuid, u32>, node: Uuid, visiting: &mut HashSet<Uuid>) -> u32 {
        if let Some(&d) = memo.get(&node) {
            return d;
        }
        if !visiting.insert(node) {
            // A cycle slipped past the insert-time guard; treat as depth 0
            // rather than recursing forever.
            return 0;
        }
        let depth = match graph.prereqs.get(&node) {
            None => 0,
            Some(prereqs) if prereqs.is_empty() => 0,
            Some(prereqs) => {
                1 + prereqs
                    .iter()
                    .map(|&p| Self::depth_of(graph, memo, p, visiting))
                    .max()
                    .unwrap_or(0)
            }
        };
        visiting.remove(&node);
        memo.insert(node, depth);
        depth
    }
}

#[async_trait]
impl<S, C> DependencyResolver for InMemoryDependencyResolver<S, C>
where
    S: Store,
    C: Clock,
{
    async fn detect_circular_dependencies(&self, dependent: Uuid, new_prereqs: &[Uuid]) -> QueueResult<bool> {
        self.ensure_fresh().await?;
        let cache = self.cache.read().await;
        for &prereq in new_prereqs {
            if prereq == dependent {
                return Ok(true);
            }
            if Self::find_path(&cache.graph, prereq, dependent).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn calculate_dependency_depth(&self, task_id: Uuid) -> QueueResult<u32> {
        self.ensure_fresh().await?;
        let mut cache = self.cache.write().await;
        if let Some(&d) = cache.depth_memo.get(&task_id) {
            return Ok(d);
        }
        let mut visiting = HashSet::new();
        let CacheState { graph, depth_memo, .. } = &mut *cache;
        let depth = Self::depth_of(graph, depth_memo, task_id, &mut visiting);
        Ok(depth)
    }

    async fn get_execution_order(&self, task_ids: &[Uuid]) -> QueueResult<Vec<Uuid>> {
        self.ensure_fresh().await?;
        let cache = self.cache.read().await;
        let wanted: HashSet<Uuid> = task_ids.iter().copied().collect();

        let mut in_degree: HashMap<Uuid, usize> = task_ids.iter().map(|&id| (id, 0)).collect();
        for &id in task_ids {
            if let Some(prereqs) = cache.graph.prereqs.get(&id) {
                in_degree.insert(id, prereqs.iter().filter(|p| wanted.contains(p)).count());
            }
        }

        let mut priorities = HashMap::new();
        for &id in task_ids {
            let p = self.store.get_task(id).await?.map(|t| t.computed_priority).unwrap_or(0.0);
            priorities.insert(id, p);
        }

        let mut ready: Vec<Uuid> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(task_ids.len());
        let mut remaining_in_degree = in_degree.clone();

        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                priorities[b]
                    .partial_cmp(&priorities[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            });
            let next = ready.remove(0);
            order.push(next);

            if let Some(dependents) = cache.graph.dependents.get(&next) {
                for &dep in dependents {
                    if !wanted.contains(&dep) {
                        continue;
                    }
                    if let Some(deg) = remaining_in_degree.get_mut(&dep) {
                        *deg = deg.saturating_sub(1);
                        if *deg == 0 {
                            ready.push(dep);
                        }
                    }
                }
            }
        }

        Ok(order)
    }

    async fn get_execution_plan(&self, task_ids: &[Uuid]) -> QueueResult<Vec<Vec<Uuid>>> {
        self.ensure_fresh().await?;
        let cache = self.cache.read().await;
        let wanted: HashSet<Uuid> = task_ids.iter().copied().collect();

        let mut remaining_in_degree: HashMap<Uuid, usize> = task_ids.iter().map(|&id| (id, 0)).collect();
        for &id in task_ids {
            if let Some(prereqs) = cache.graph.prereqs.get(&id) {
                remaining_in_degree.insert(id, prereqs.iter().filter(|p| wanted.contains(p)).count());
            }
        }

        let mut plan = Vec::new();
        let mut done: HashSet<Uuid> = HashSet::new();

        while done.len() < task_ids.len() {
            let mut level: Vec<Uuid> = remaining_in_degree
                .iter()
                .filter(|(id, &deg)| deg == 0 && !done.contains(*id))
                .map(|(&id, _)| id)
                .collect();

            if level.is_empty() {
                // Graph has a residual cycle among task_ids; surface the
                // rest as one final level rather than looping forever.
                level = task_ids.iter().copied().filter(|id| !done.contains(id)).collect();
            }
            level.sort();

            for &id in &level {
                done.insert(id);
                if let Some(dependents) = cache.graph.dependents.get(&id) {
                    for &dep in dependents {
                        if let Some(deg) = remaining_in_degree.get_mut(&dep) {
                            *deg = deg.saturating_sub(1);
                        }
                    }
                }
            }
            plan.push(level);
        }

        Ok(plan)
    }

    async fn are_all_dependencies_met(&self, task_id: Uuid) -> QueueResult<bool> {
        let deps = self.store.get_dependencies(task_id).await?;
        for dep in deps {
            match self.store.get_task(dep.prerequisite_task_id).await? {
                Some(task) if task.status == crate::domain::models::TaskStatus::Completed => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn validate_new_dependency(&self, dependent: Uuid, prerequisite: Uuid) -> QueueResult<()> {
        if self.store.get_task(dependent).await?.is_none() {
            return Err(QueueError::not_found("task", dependent));
        }
        if self.store.get_task(prerequisite).await?.is_none() {
            return Err(QueueError::not_found("task", prerequisite));
        }

        self.ensure_fresh().await?;
        let path = {
            let cache = self.cache.read().await;
            if prerequisite == dependent {
                Some(vec![dependent])
            } else {
                Self::find_path(&cache.graph, prerequisite, dependent)
            }
        };

        if let Some(path) = path {
            return Err(QueueError::Cycle {
                dependent,
                prerequisite,
                path,
            });
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = CacheState::default();
    }
}
