pub(crate) mod class_a;
