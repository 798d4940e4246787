pub mod training_hooks;
