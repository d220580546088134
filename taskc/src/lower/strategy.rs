//! The choices that differ between runtime ABIs, selected once per pass.

use crate::config::LowerOptions;
use crate::config::Runtime;
use crate::config::RuntimeInterface;
use crate::config::DEPS_API_DIMENSIONS;
use crate::ir::Directionality;
use crate::ir::Type;
use crate::lower::layout::FieldOrder;

/// How dependency descriptors are handed to the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorShape {
    /// One address with a byte offset and a total size per dependency.
    Flat,
    /// A per-dimension region array per dependency.
    Dimensions,
}

/// Direction flags of one dependency descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DependencyFlags {
    pub input: bool,
    pub output: bool,
    pub concurrent: bool,
}

impl DependencyFlags {
    /// A concurrent dependency reads and writes.
    pub fn new(directionality: Directionality) -> Self {
        let concurrent = directionality.contains(Directionality::CONCURRENT);
        Self {
            input: directionality.contains(Directionality::IN) || concurrent,
            output: directionality.contains(Directionality::OUT) || concurrent,
            concurrent,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerializationStrategy {
    pub runtime: Runtime,
    pub field_order: FieldOrder,
    pub shape: DescriptorShape,
    /// Set `input` on every output dependency.
    pub force_in_on_out: bool,
}

impl SerializationStrategy {
    pub fn kmp() -> Self {
        Self {
            runtime: Runtime::Kmp,
            field_order: FieldOrder::Grouped,
            shape: DescriptorShape::Flat,
            force_in_on_out: true,
        }
    }
    /// The region array needs `deps_api` 1001; older runtimes get the flat
    /// shape and its flag quirk.
    pub fn nanos(interface: &RuntimeInterface) -> Self {
        let dimensions = interface.interface_is_at_least("deps_api", DEPS_API_DIMENSIONS);
        let shape = if dimensions {
            DescriptorShape::Dimensions
        } else {
            DescriptorShape::Flat
        };
        Self {
            runtime: Runtime::Nanos,
            field_order: FieldOrder::Insertion,
            shape,
            force_in_on_out: !dimensions,
        }
    }
    pub fn select(runtime: Runtime, options: &LowerOptions) -> Self {
        match runtime {
            Runtime::Kmp => Self::kmp(),
            Runtime::Nanos => Self::nanos(&options.interface),
        }
    }
    pub fn flags(&self, directionality: Directionality) -> DependencyFlags {
        let mut flags = DependencyFlags::new(directionality);
        if self.force_in_on_out && flags.output {
            flags.input = true;
        }
        flags
    }
    pub fn abi(&self) -> RuntimeAbi {
        RuntimeAbi::of(self.runtime, self.shape)
    }
}

/// Runtime type names that generated declarations refer to.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeAbi {
    /// The task object or work descriptor.
    pub task: Type,
    pub dependency: Type,
    /// The type that outlined functions are passed to the runtime as.
    pub routine: Type,
}

impl RuntimeAbi {
    pub fn of(runtime: Runtime, shape: DescriptorShape) -> Self {
        match runtime {
            Runtime::Kmp => Self {
                task: Type::named("kmp_task_t"),
                dependency: Type::named("kmp_depend_info_t"),
                routine: Type::named("kmp_routine_entry_t"),
            },
            Runtime::Nanos => {
                let dependency = match shape {
                    DescriptorShape::Flat => "nanos_dependence_t",
                    DescriptorShape::Dimensions => "nanos_data_access_t",
                };
                let routine = Type::Function {
                    ret: Box::new(Type::Void),
                    params: vec![Type::Void.pointer()],
                };
                Self {
                    task: Type::named("nanos_wd_t"),
                    dependency: Type::named(dependency),
                    routine: routine.pointer(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_algebra() {
        let cases = [
            (Directionality::IN, (true, false, false)),
            (Directionality::OUT, (false, true, false)),
            (Directionality::INOUT, (true, true, false)),
            (Directionality::CONCURRENT, (true, true, true)),
        ];
        for (directionality, (input, output, concurrent)) in cases {
            let flags = DependencyFlags::new(directionality);
            assert_eq!(flags.input, input, "{directionality:?}");
            assert_eq!(flags.output, output, "{directionality:?}");
            assert_eq!(flags.concurrent, concurrent, "{directionality:?}");
        }
    }

    #[test]
    fn test_selection() {
        let options = LowerOptions::default();
        let current = SerializationStrategy::select(Runtime::Nanos, &options);
        assert_eq!(current.shape, DescriptorShape::Dimensions);
        assert_eq!(current.field_order, FieldOrder::Insertion);
        assert!(!current.flags(Directionality::OUT).input);

        let options = options.with_interface("deps_api", 1000);
        let legacy = SerializationStrategy::select(Runtime::Nanos, &options);
        assert_eq!(legacy.shape, DescriptorShape::Flat);
        assert!(legacy.flags(Directionality::OUT).input);
        assert_eq!(legacy.abi().dependency.to_string(), "nanos_dependence_t");

        let kmp = SerializationStrategy::select(Runtime::Kmp, &options);
        assert_eq!(kmp.field_order, FieldOrder::Grouped);
        assert!(kmp.flags(Directionality::OUT).input);
        assert!(!kmp.flags(Directionality::IN).output);
        assert_eq!(kmp.abi().routine.to_string(), "kmp_routine_entry_t");
        assert_eq!(current.abi().routine.to_string(), "void (*)(void *)");
    }
}
