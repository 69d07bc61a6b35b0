// Ordered teardown of Vulkan objects
//
// Every object the bootstrap creates is paired with the action that destroys
// it. Actions run in reverse push order, either explicitly or on drop, so a
// failure halfway through the sequence only unwinds what was actually built.

/// One created object and how to destroy it
struct Stage {
    name: &'static str,
    destroy: Box<dyn FnOnce()>,
}

/// Stack of destroy actions, unwound last-in first-out
#[derive(Default)]
pub struct Teardown {
    stages: Vec<Stage>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the destroy action for an object that was just created.
    ///
    /// The action must only reference handles that are still valid when every
    /// stage pushed after it has been destroyed.
    pub fn push(&mut self, name: &'static str, destroy: impl FnOnce() + 'static) {
        log::debug!("Created {}", name);
        self.stages.push(Stage {
            name,
            destroy: Box::new(destroy),
        });
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the live stages, in creation order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|stage| stage.name)
    }

    /// Destroy everything, newest first
    pub fn unwind(&mut self) {
        while let Some(stage) = self.stages.pop() {
            log::debug!("Destroying {}", stage.name);
            (stage.destroy)();
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::debug!("Unwinding {} objects", self.len());
            self.unwind();
        }
    }
}
