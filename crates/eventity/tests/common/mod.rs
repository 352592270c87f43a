// ABOUTME: Shared fixture entities and events for the integration tests.
// ABOUTME: A todo-list entity plus a second note entity for cross-type tag checks.

use eventity::{Entity, EntityEvent, TransitionTable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: String,
    pub title: String,
    pub items: Vec<String>,
}

impl Entity for TodoList {
    const ENTITY_TYPE: &'static str = "todo-list";

    fn transitions(table: &mut TransitionTable<Self>) {
        table.on::<TodoListCreated>();
        table.on::<TodoAdded>();
    }
}

#[derive(Serialize, Deserialize)]
pub struct TodoListCreated {
    pub id: String,
    pub title: String,
}

impl EntityEvent for TodoListCreated {
    type Entity = TodoList;
    const EVENT_TYPE: &'static str = "todo-list-created";

    fn apply(self, _previous: Option<TodoList>) -> TodoList {
        TodoList {
            id: self.id,
            title: self.title,
            items: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct TodoAdded {
    pub todo: String,
}

impl EntityEvent for TodoAdded {
    type Entity = TodoList;
    const EVENT_TYPE: &'static str = "todo-added";

    fn apply(self, previous: Option<TodoList>) -> TodoList {
        let mut list = previous.unwrap_or_default();
        list.items.push(self.todo);
        list
    }
}

pub fn created(id: &str, title: &str) -> TodoListCreated {
    TodoListCreated {
        id: id.to_string(),
        title: title.to_string(),
    }
}

pub fn added(todo: &str) -> TodoAdded {
    TodoAdded {
        todo: todo.to_string(),
    }
}

/// A second entity type sharing tag strings with todo lists, for checking
/// that the tag index never leaks across entity-type namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
}

impl Entity for Note {
    const ENTITY_TYPE: &'static str = "note";

    fn transitions(table: &mut TransitionTable<Self>) {
        table.on::<NoteWritten>();
    }
}

#[derive(Serialize, Deserialize)]
pub struct NoteWritten {
    pub id: String,
    pub body: String,
}

impl EntityEvent for NoteWritten {
    type Entity = Note;
    const EVENT_TYPE: &'static str = "note-written";

    fn apply(self, _previous: Option<Note>) -> Note {
        Note {
            id: self.id,
            body: self.body,
        }
    }
}

pub fn note(id: &str, body: &str) -> NoteWritten {
    NoteWritten {
        id: id.to_string(),
        body: body.to_string(),
    }
}
