use anvil_cli::crd::{Task, TaskRun};
use kube::CustomResourceExt;

fn main() {
    println!("---");
    println!("# Task CRD");
    println!("{}", serde_yaml::to_string(&Task::crd()).unwrap());

    println!("---");
    println!("# TaskRun CRD");
    println!("{}", serde_yaml::to_string(&TaskRun::crd()).unwrap());
}
