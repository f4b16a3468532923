pub mod visit_model;
