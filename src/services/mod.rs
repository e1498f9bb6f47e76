/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Host-driven game progression: start, answers, advance, end and restart.
pub mod progression;
/// Background deletion of finished and abandoned rooms.
pub mod room_reaper;
/// Room creation, membership and read-only projections.
pub mod room_service;
/// Time-bonus scoring rules.
pub mod scoring;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events subscription service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
