mod common;
mod middleware;
mod remote_http;
mod stitching;
