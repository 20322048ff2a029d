// Résumé flows: upload (PDF → AI → LaTeX → PDF) and recompile (edited LaTeX → PDF).

pub mod handlers;
pub mod pipeline;
pub mod repository;
