mod history;
mod ledger;
mod policy;
mod rules;
mod sites;
