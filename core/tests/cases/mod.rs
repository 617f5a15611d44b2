mod determinism;
mod link_physics;
mod routing;
