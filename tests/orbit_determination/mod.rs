mod config;
mod estimation;
mod lighttime;
mod partials;
