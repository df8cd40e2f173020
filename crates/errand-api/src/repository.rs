//! Todo storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errand_core::ErrandResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::todo::{Todo, TodoId, TodoInput};

/// Persistence for todos.
///
/// Backend failures must surface as `ErrandError::StoreUnavailable`.
#[async_trait]
pub trait TodoRepository: Send + Sync + 'static {
    /// Returns every todo in id order.
    async fn list(&self) -> ErrandResult<Vec<Todo>>;

    /// Returns one todo.
    async fn get(&self, id: TodoId) -> ErrandResult<Option<Todo>>;

    /// Stores a new todo and returns it with its id and timestamp.
    async fn create(&self, input: TodoInput) -> ErrandResult<Todo>;

    /// Replaces `name` and `task`. `None` if the todo does not exist.
    async fn update(&self, id: TodoId, input: TodoInput) -> ErrandResult<Option<Todo>>;

    /// Deletes a todo. `false` if it did not exist.
    async fn delete(&self, id: TodoId) -> ErrandResult<bool>;
}

/// Todos kept in process memory. Ids start at 1 and are never reused.
pub struct InMemoryTodoRepository {
    todos: RwLock<BTreeMap<TodoId, Todo>>,
    last_id: AtomicU64,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl InMemoryTodoRepository {
    /// Creates an empty repository stamped with the system clock.
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Creates an empty repository with an injected clock.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            todos: RwLock::new(BTreeMap::new()),
            last_id: AtomicU64::new(0),
            clock: Arc::new(clock),
        }
    }

    /// Returns the number of stored todos.
    pub fn len(&self) -> usize {
        self.todos.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.todos.read().is_empty()
    }
}

impl Default for InMemoryTodoRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTodoRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTodoRepository")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn list(&self) -> ErrandResult<Vec<Todo>> {
        Ok(self.todos.read().values().cloned().collect())
    }

    async fn get(&self, id: TodoId) -> ErrandResult<Option<Todo>> {
        Ok(self.todos.read().get(&id).cloned())
    }

    async fn create(&self, input: TodoInput) -> ErrandResult<Todo> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let todo = Todo {
            id,
            name: input.name,
            task: input.task,
            timestamp: (self.clock)(),
        };
        self.todos.write().insert(id, todo.clone());
        Ok(todo)
    }

    async fn update(&self, id: TodoId, input: TodoInput) -> ErrandResult<Option<Todo>> {
        let mut todos = self.todos.write();
        Ok(todos.get_mut(&id).map(|todo| {
            todo.name = input.name;
            todo.task = input.task;
            todo.clone()
        }))
    }

    async fn delete(&self, id: TodoId) -> ErrandResult<bool> {
        Ok(self.todos.write().remove(&id).is_some())
    }
}
