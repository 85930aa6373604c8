mod builders;
mod handlers;
mod middlewares;
mod processing_middlewares;
