use std::{
    error::Error,
    sync::{Arc, OnceLock},
};

use tracing_subscriber::EnvFilter;
use trellis_di::{
    Args, CurriedHandle, Declaration, Dependency, DynError, FromFn, Registration, Registry, Resolution, Resolved,
    Wire,
};

trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

struct Console;
impl Logger for Console {
    fn log(&self, message: &str) {
        println!("[console] {message}");
    }
}

struct Quiet;
impl Logger for Quiet {
    fn log(&self, _message: &str) {}
}

struct Inventory {
    logger: Arc<dyn Logger>,
}
impl Wire for Inventory {
    fn declare(declaration: &mut Declaration) {
        declaration.dependency("logger", Dependency::on::<dyn Logger>());
    }

    fn construct(dependencies: &Resolved, _args: &Args) -> Result<Self, DynError> {
        Ok(Inventory {
            logger: dependencies.get("logger")?,
        })
    }
}

#[derive(Debug)]
struct Order {
    id: u32,
}

/// Needs a notifier, which needs the checkout back
struct Checkout {
    inventory: Arc<Inventory>,
    orders: CurriedHandle,
    notifier: OnceLock<Arc<Notifier>>,
}
impl Wire for Checkout {
    fn declare(declaration: &mut Declaration) {
        declaration
            .provides_feature("checkout")
            .dependency("inventory", Dependency::on::<Inventory>())
            .handle_dependency("orders", Dependency::on::<Order>())
            .setter_dependency("notifier", Dependency::on::<Notifier>());
    }

    fn construct(dependencies: &Resolved, _args: &Args) -> Result<Self, DynError> {
        Ok(Checkout {
            inventory: dependencies.get("inventory")?,
            orders: dependencies.handle("orders")?,
            notifier: OnceLock::new(),
        })
    }

    fn inject(&self, argument: &str, value: Resolution) -> Result<(), DynError> {
        match (argument, value) {
            ("notifier", Resolution::One(notifier)) => {
                let _ = self.notifier.set(notifier.downcast::<Notifier>()?);
                Ok(())
            }
            (argument, _) => Err(format!("Checkout has no setter '{argument}'").into()),
        }
    }

    fn post_initialize(&self) -> Result<(), DynError> {
        self.inventory.logger.log("checkout ready");
        Ok(())
    }
}

struct Notifier {
    checkout: Arc<Checkout>,
}
impl Wire for Notifier {
    fn declare(declaration: &mut Declaration) {
        declaration.dependency("checkout", Dependency::on::<Checkout>());
    }

    fn construct(dependencies: &Resolved, _args: &Args) -> Result<Self, DynError> {
        Ok(Notifier {
            checkout: dependencies.get("checkout")?,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,trellis_di=debug")))
        .init();

    let registry = Registry::new();
    registry.declare_subtype::<Console, dyn Logger>(|console| console);
    registry.declare_subtype::<Quiet, dyn Logger>(|quiet| quiet);

    registry.add(Registration::instance(Console).default())?;
    registry.add(Registration::instance(Quiet).feature("quiet"))?;
    registry.add(Registration::wired::<Inventory>())?;
    registry.add(Registration::wired::<Checkout>().name("checkout"))?;
    registry.add(Registration::wired::<Notifier>())?;
    registry.add(
        Registration::producer(FromFn::new(|_, args| Ok(Order { id: *args.get::<u32>(0)? }))).transient(),
    )?;

    registry.validate()?;

    let checkout = registry.named::<Checkout>("checkout")?;
    let notifier = checkout.notifier.get().ok_or("notifier was not injected")?;
    println!("notifier sees the same checkout: {}", Arc::ptr_eq(&notifier.checkout, &checkout));

    let order = checkout.orders.build_as::<Order>(Args::new().push(7u32))?;
    checkout.inventory.logger.log(&format!("placed {order:?}"));

    println!("{}", registry.graph().to_dot());
    Ok(())
}
