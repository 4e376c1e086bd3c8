mod articles;
mod feeds;
mod schema;
mod status;
mod types;

pub use schema::Database;
pub use types::{
    Article, DatabaseError, Feed, FeedUpdate, NewArticle, NewFeed, ReaderStatus, StatusChange,
};
